use std::process::Command;
use tempfile::TempDir;

#[test]
fn test_init_command() {
    let temp_dir = TempDir::new().unwrap();
    let temp_path = temp_dir.path();

    let output = Command::new(env!("CARGO_BIN_EXE_classwatch"))
        .arg("init")
        .current_dir(temp_path)
        .output()
        .expect("Failed to run init command");

    assert!(output.status.success());

    let config_path = temp_path.join(".classwatch/settings.toml");
    assert!(config_path.exists());

    let content = std::fs::read_to_string(&config_path).unwrap();
    assert!(content.contains("version = 1"));
    assert!(content.contains("[watch]"));
    assert!(content.contains("target/classes"));
}

#[test]
fn test_init_refuses_to_overwrite() {
    let temp_dir = TempDir::new().unwrap();
    let config_dir = temp_dir.path().join(".classwatch");
    std::fs::create_dir_all(&config_dir).unwrap();
    std::fs::write(config_dir.join("settings.toml"), "version = 7\n").unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_classwatch"))
        .arg("init")
        .current_dir(temp_dir.path())
        .output()
        .expect("Failed to run init command");

    assert!(!output.status.success());
    let content = std::fs::read_to_string(config_dir.join("settings.toml")).unwrap();
    assert_eq!(content, "version = 7\n");
}

#[test]
fn test_config_command() {
    let temp_dir = TempDir::new().unwrap();
    let temp_path = temp_dir.path();

    let config_dir = temp_path.join(".classwatch");
    std::fs::create_dir_all(&config_dir).unwrap();

    let config_content = r#"
version = 2
[watch]
roots = ["build/classes/java/main"]
settle_ms = 0
"#;

    std::fs::write(config_dir.join("settings.toml"), config_content).unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_classwatch"))
        .arg("config")
        .current_dir(temp_path)
        .output()
        .expect("Failed to run config command");

    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("version = 2"));
    assert!(stdout.contains("build/classes/java/main"));
    assert!(stdout.contains("settle_ms = 0"));
}

#[test]
fn test_custom_config_flag() {
    let temp_dir = TempDir::new().unwrap();
    let custom = temp_dir.path().join("custom.toml");
    std::fs::write(&custom, "[engine]\ncontext = \"devtools\"\n").unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_classwatch"))
        .arg("--config")
        .arg(&custom)
        .arg("config")
        .current_dir(temp_dir.path())
        .output()
        .expect("Failed to run config command");

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("context = \"devtools\""));
}

#[test]
fn test_missing_custom_config_fails() {
    let temp_dir = TempDir::new().unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_classwatch"))
        .args(["--config", "absent.toml", "config"])
        .current_dir(temp_dir.path())
        .output()
        .expect("Failed to run config command");

    assert!(!output.status.success());
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("Config file not found"));
}

#[test]
fn test_watch_missing_root_fails() {
    let temp_dir = TempDir::new().unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_classwatch"))
        .args(["watch", "does/not/exist"])
        .current_dir(temp_dir.path())
        .output()
        .expect("Failed to run watch command");

    assert!(!output.status.success());
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("Failed to start the watcher"));
}
