use std::process::Command;

#[test]
fn fails_without_jwt_secret() {
    let exe = env!("CARGO_BIN_EXE_jaipurhelp");
    let output = Command::new(exe)
        .env_remove("JWT_SECRET")
        .env_remove("JWT_SECRET_FILE")
        .output()
        .expect("failed to run jaipurhelp binary");
    assert!(!output.status.success());
}
