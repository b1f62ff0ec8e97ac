//! `abrdb test-connection`

use abr_resolve::diagnostics::test_connection_from_env;

pub async fn run() -> anyhow::Result<()> {
    let report = test_connection_from_env().await;

    let mark = |passed: bool| if passed { "ok" } else { "failed" };
    println!("configuration:  {}", mark(report.config_valid));
    println!("reachability:   {}", mark(report.reachable));
    println!("authentication: {}", mark(report.authenticated));
    if let Some(detail) = &report.detail {
        println!("  {detail}");
    }

    if !report.all_passed() {
        anyhow::bail!("connection test failed");
    }
    Ok(())
}
