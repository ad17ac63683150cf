use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

const HEADER: &str = "Identificador,Designacao,Preco,Ano,Kilometragem,TipoCombustivel,Cidade,Cilindrada,PotenciaMotor,TipoTransmissao,CategoriaVeiculo,Latitude,Longitude";

fn fleet_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("fleet");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    let batches = root.join("batches");
    fs::create_dir_all(&batches).unwrap();

    write_batch(
        &root,
        "carros_1.csv",
        &[
            "V1,Toyota Corolla,15000,2019,50000,Petrol,Porto,1600,120,Manual,Sedan,41.15,-8.61",
            "V2,Toyota Yaris,9000,2020,30000,Petrol,Lisboa,1000,70,Manual,Hatchback,38.72,-9.14",
            "V3,BMW 320d,32000,2021,20000,Diesel,Porto,2000,190,Automatic,Sedan,41.16,-8.62",
        ],
    );
    write_batch(
        &root,
        "carros_2.csv",
        &[
            "V1,Toyota Corolla,14000,2019,60000,Petrol,Braga,1600,120,Manual,Sedan,41.55,-8.42",
            "V4,Toyota Hilux,28000,2018,90000,Diesel,Faro,2400,150,Manual,Pickup,37.02,-7.93",
        ],
    );
    write_batch(
        &root,
        "carros_bad.csv",
        &[
            "V5,Renault Clio,12000,2019,40000,Petrol,Porto,1200,90,Manual,Hatchback,41.15,-8.61",
            "V6,Giveaway,0,2019,1,Petrol,Porto,1200,90,Manual,Hatchback,41.15,-8.61",
        ],
    );

    let config_content = format!(
        r#"[db]
path = "{}/data/fleet.sqlite"

[server]
bind = "127.0.0.1:7341"

[ingest]
validator_prefix = "fleet-test"
"#,
        root.display()
    );

    let config_path = config_dir.join("fleet.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn write_batch(root: &Path, name: &str, rows: &[&str]) {
    let mut content = String::from(HEADER);
    for row in rows {
        content.push('\n');
        content.push_str(row);
    }
    content.push('\n');
    fs::write(root.join("batches").join(name), content).unwrap();
}

fn batch(config_path: &Path, name: &str) -> String {
    config_path
        .parent()
        .unwrap()
        .parent()
        .unwrap()
        .join("batches")
        .join(name)
        .to_str()
        .unwrap()
        .to_string()
}

fn run_fleet(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = fleet_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run fleet binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn query_json(config_path: &Path, kind: &str, term: &str) -> serde_json::Value {
    let (stdout, stderr, success) = run_fleet(config_path, &["query", kind, term]);
    assert!(success, "query failed: stdout={}, stderr={}", stdout, stderr);
    serde_json::from_str(&stdout).unwrap()
}

#[test]
fn test_init_creates_database() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_fleet(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_fleet(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_fleet(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_ingest_then_query() {
    let (_tmp, config_path) = setup_test_env();
    run_fleet(&config_path, &["init"]);

    let file = batch(&config_path, "carros_1.csv");
    let (stdout, stderr, success) =
        run_fleet(&config_path, &["ingest", &file, "--request-id", "REQ-7"]);
    assert!(success, "ingest failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Status:  SUCCESS"));
    assert!(stdout.contains("Records: 3"));

    let brand = query_json(&config_path, "brand", "toyota");
    assert_eq!(brand["count"], 2);
    assert_eq!(brand["avg_price"], 12000.0);
    assert_eq!(brand["avg_odometer"], 40000.0);

    let segment = query_json(&config_path, "segment", "SEDAN");
    assert_eq!(segment["count"], 2);

    let location = query_json(&config_path, "location", "porto");
    assert_eq!(location["count"], 2);
    assert_eq!(location["total_price"], 47000.0);
}

#[test]
fn test_zero_price_batch_is_rejected_whole() {
    let (_tmp, config_path) = setup_test_env();
    run_fleet(&config_path, &["init"]);

    let file = batch(&config_path, "carros_bad.csv");
    let (stdout, _stderr, success) = run_fleet(&config_path, &["ingest", &file]);
    assert!(!success, "zero-price batch should fail");
    assert!(stdout.contains("MAPPING_ERROR"));

    // The valid first row must not have been stored either
    let brand = query_json(&config_path, "brand", "renault");
    assert_eq!(brand["count"], 0);
    assert_eq!(brand["avg_price"], 0.0);
}

#[test]
fn test_reingest_does_not_change_counts() {
    let (_tmp, config_path) = setup_test_env();
    run_fleet(&config_path, &["init"]);

    let file = batch(&config_path, "carros_1.csv");
    run_fleet(&config_path, &["ingest", &file]);
    let first = query_json(&config_path, "brand", "");

    let (_, _, success) = run_fleet(&config_path, &["ingest", &file]);
    assert!(success);
    let second = query_json(&config_path, "brand", "");
    assert_eq!(first, second);
    assert_eq!(second["count"], 3);
}

#[test]
fn test_earliest_snapshot_wins_across_batches() {
    let (_tmp, config_path) = setup_test_env();
    run_fleet(&config_path, &["init"]);

    run_fleet(&config_path, &["ingest", &batch(&config_path, "carros_1.csv")]);
    run_fleet(&config_path, &["ingest", &batch(&config_path, "carros_2.csv")]);

    // V1 keeps its first snapshot (15000, Porto); V4 is new
    let brand = query_json(&config_path, "brand", "corolla");
    assert_eq!(brand["count"], 1);
    assert_eq!(brand["avg_price"], 15000.0);

    // Filter runs before dedup: V1's later Braga snapshot still matches
    let braga = query_json(&config_path, "location", "braga");
    assert_eq!(braga["count"], 1);
    assert_eq!(braga["total_price"], 14000.0);

    let toyota = query_json(&config_path, "brand", "toyota");
    assert_eq!(toyota["count"], 3);
}

#[test]
fn test_stats_reports_versions() {
    let (_tmp, config_path) = setup_test_env();
    run_fleet(&config_path, &["init"]);

    run_fleet(&config_path, &["ingest", &batch(&config_path, "carros_1.csv")]);
    run_fleet(
        &config_path,
        &[
            "ingest",
            &batch(&config_path, "carros_2.csv"),
            "--mapper-version",
            "1.1",
        ],
    );

    let (stdout, stderr, success) = run_fleet(&config_path, &["stats"]);
    assert!(success, "stats failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Documents:   2"));
    assert!(stdout.contains("Vehicles:    5"));
    assert!(stdout.contains("Distinct:    4"));
    assert!(stdout.contains("1.1"));
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_fleet(&tmp.path().join("nope.toml"), &["stats"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}
