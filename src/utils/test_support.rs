//! Fixtures shared by unit and integration tests.

use serde_json::{Value, json};

/// A valid record mixing every accepted spelling style.
pub fn sample_record_json() -> Value {
    json!({
        "mainroad": "yes",
        "guestroom": "No",
        "basement": "NO",
        "hotwaterheating": "no",
        "airconditioning": "Yes",
        "prefarea": "YES",
        "furnishingstatus": "Semi-Furnished",
        "area": 7420,
        "bedrooms": 4,
        "bathrooms": 2,
        "stories": 3,
        "parking": 2
    })
}

/// Mock HTTP servers need a loopback listener; some sandboxes refuse one.
pub fn should_skip_httpmock() -> bool {
    match std::net::TcpListener::bind(("127.0.0.1", 0)) {
        Ok(_) => false,
        Err(err) if err.kind() == std::io::ErrorKind::PermissionDenied => {
            eprintln!("skipping httpmock test: cannot bind to localhost");
            true
        }
        Err(err) => panic!("failed to bind localhost for httpmock tests: {err}"),
    }
}
