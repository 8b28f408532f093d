use predicates::prelude::*;

/// `kx-cli kill-switch on/off` must flip the persisted risk state and print
/// the resulting `kill_switch` value.
///
/// DB-backed test, skipped if KX_DATABASE_URL is not set.
#[tokio::test]
async fn cli_kill_switch_on_then_off() -> anyhow::Result<()> {
    let url = match std::env::var(kx_db::ENV_DB_URL) {
        Ok(v) => v,
        Err(_) => {
            eprintln!("SKIP: KX_DATABASE_URL not set");
            return Ok(());
        }
    };

    let pool = match sqlx::postgres::PgPoolOptions::new().max_connections(2).connect(&url).await {
        Ok(p) => p,
        Err(e) => {
            eprintln!("SKIP: cannot connect to DB: {e}");
            return Ok(());
        }
    };
    if let Err(e) = kx_db::migrate(&pool).await {
        eprintln!("SKIP: cannot migrate DB: {e}");
        return Ok(());
    }

    let mut on_cmd = assert_cmd::Command::cargo_bin("kx-cli")?;
    on_cmd
        .env(kx_db::ENV_DB_URL, &url)
        .args(["kill-switch", "on", "--reason", "cli_test"]);
    on_cmd
        .assert()
        .success()
        .stdout(predicate::str::contains("kill_switch=On"));

    let mut off_cmd = assert_cmd::Command::cargo_bin("kx-cli")?;
    off_cmd
        .env(kx_db::ENV_DB_URL, &url)
        .args(["kill-switch", "off", "--reason", "cli_test_cleanup"]);
    off_cmd
        .assert()
        .success()
        .stdout(predicate::str::contains("kill_switch=Off"));

    Ok(())
}

/// `kx-cli db status` must report `db_ok=true` against a reachable, migrated
/// database. Skipped if KX_DATABASE_URL is not set.
#[tokio::test]
async fn cli_db_status_reports_ok() -> anyhow::Result<()> {
    let url = match std::env::var(kx_db::ENV_DB_URL) {
        Ok(v) => v,
        Err(_) => {
            eprintln!("SKIP: KX_DATABASE_URL not set");
            return Ok(());
        }
    };

    let mut cmd = assert_cmd::Command::cargo_bin("kx-cli")?;
    cmd.env(kx_db::ENV_DB_URL, &url).args(["db", "migrate"]);
    let output = cmd.output()?;
    if !output.status.success() {
        eprintln!("SKIP: cannot migrate DB");
        return Ok(());
    }

    let mut status_cmd = assert_cmd::Command::cargo_bin("kx-cli")?;
    status_cmd.env(kx_db::ENV_DB_URL, &url).args(["db", "status"]);
    status_cmd
        .assert()
        .success()
        .stdout(predicate::str::contains("db_ok=true"));

    Ok(())
}
