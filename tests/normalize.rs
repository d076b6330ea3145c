use cms_dataset_sync::normalize::to_snake_case;

#[test]
fn documented_examples() {
    assert_eq!(
        to_snake_case("Hospital General Information"),
        "hospital_general_information"
    );
    assert_eq!(to_snake_case("  A--B__C "), "a_b_c");
    assert_eq!(
        to_snake_case("Hospital-Acquired Condition (HAC) Reduction Program"),
        "hospital_acquired_condition_hac_reduction_program"
    );
    assert_eq!(to_snake_case("Measure Start Date"), "measure_start_date");
}

#[test]
fn output_alphabet_holds_for_awkward_inputs() {
    let inputs = [
        "",
        " ",
        "_",
        "__x__",
        "ZIP Code",
        "Rating (1-5)",
        "\u{feff}Facility ID",
        "Émergency\tDept\r\nVisits",
        "100% of Beds",
        "a\u{0}b",
        "Payment — Lower Estimate",
        "already_snake_case",
    ];
    for input in inputs {
        let token = to_snake_case(input);
        assert!(
            token
                .chars()
                .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '_'),
            "{input:?} -> {token:?}"
        );
        assert!(!token.starts_with('_'), "{input:?} -> {token:?}");
        assert!(!token.ends_with('_'), "{input:?} -> {token:?}");
        assert!(!token.contains("__"), "{input:?} -> {token:?}");
    }
}

#[test]
fn byte_order_mark_is_dropped() {
    assert_eq!(to_snake_case("\u{feff}Facility ID"), "facility_id");
}

#[test]
fn idempotent() {
    let once = to_snake_case("Hospital Type / Ownership");
    assert_eq!(to_snake_case(&once), once);
}
