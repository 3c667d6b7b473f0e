//! Diesel schema definitions for the measurement tables served by the API.

diesel::table! {
    use diesel::sql_types::*;

    power_measurements (device, timestamp) {
        device -> Text,
        timestamp -> Timestamp,
        phase_a_current -> Float8,
        phase_a_voltage -> Float8,
        phase_a_active_power -> Float8,
        phase_a_apparent_power -> Float8,
        phase_a_power_factor -> Float8,
        phase_a_frequency -> Float8,
        phase_b_current -> Float8,
        phase_b_voltage -> Float8,
        phase_b_active_power -> Float8,
        phase_b_apparent_power -> Float8,
        phase_b_power_factor -> Float8,
        phase_b_frequency -> Float8,
        phase_c_current -> Float8,
        phase_c_voltage -> Float8,
        phase_c_active_power -> Float8,
        phase_c_apparent_power -> Float8,
        phase_c_power_factor -> Float8,
        phase_c_frequency -> Float8,
        total_current -> Float8,
        total_active_power -> Float8,
        total_apparent_power -> Float8,
    }
}

diesel::table! {
    use diesel::sql_types::*;

    discrete_measurements (device, timestamp) {
        device -> Text,
        timestamp -> Timestamp,
        d1_state -> Int4,
        d2_state -> Int4,
        a1_state -> Int4,
    }
}
