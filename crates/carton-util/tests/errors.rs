use carton_util::errors::CartonError;

#[test]
fn test_parse_error_display() {
    let err = CartonError::Parse {
        input: "1.x".to_string(),
        message: "expected a minor version number".to_string(),
    };
    assert_eq!(
        err.to_string(),
        "Parse error: expected a minor version number in `1.x`"
    );
}

#[test]
fn test_unsatisfiable_error_lists_names() {
    let err = CartonError::Unsatisfiable {
        names: vec!["Alamofire".to_string(), "Result".to_string()],
        details: None,
    };
    assert_eq!(
        err.to_string(),
        "Unable to satisfy the dependency list for: Alamofire, Result"
    );
}

#[test]
fn test_conflicting_requirement_display() {
    let err = CartonError::ConflictingRequirement {
        name: "Result".to_string(),
        existing: "== 1.0.0".to_string(),
        requested: "== 2.0.0".to_string(),
    };
    assert_eq!(
        err.to_string(),
        "Conflicting requirements for Result: == 1.0.0 is incompatible with == 2.0.0"
    );
}

#[test]
fn test_cyclic_dependencies_display() {
    let err = CartonError::CyclicDependencies {
        members: vec!["A".to_string(), "B".to_string(), "A".to_string()],
    };
    assert_eq!(err.to_string(), "Dependency cycle detected: A -> B -> A");
}

#[test]
fn test_retrieval_shorthand() {
    let err = CartonError::retrieval("github \"owner/repo\"", "not found");
    assert_eq!(
        err.to_string(),
        "Failed to retrieve github \"owner/repo\": not found"
    );
    assert!(matches!(err, CartonError::Retrieval { .. }));
}

#[test]
fn test_internal_shorthand() {
    let err = CartonError::internal("empty cursor");
    assert_eq!(err.to_string(), "Internal resolver error: empty cursor");
}

#[test]
fn test_cancelled_display() {
    let err = CartonError::Cancelled {
        reason: "caller abandoned resolution".to_string(),
    };
    assert_eq!(
        err.to_string(),
        "Resolution cancelled: caller abandoned resolution"
    );
}

#[test]
fn test_errors_are_cloneable_and_comparable() {
    let err = CartonError::Config {
        message: "bad key".to_string(),
    };
    assert_eq!(err.clone(), err);
}
