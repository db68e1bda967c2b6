use clap::Parser;
use std::fs;
use syncstore::tooling::{Cli, CliContext, Commands};
use tempfile::TempDir;

const SLED_CONFIG: &str = r#"
[storage]
backend = "sled"
path = "data"

[cache]
update_interval_ms = 0

[channels.notes]
system = false
"#;

fn write_config(root: &TempDir) -> std::path::PathBuf {
    let path = root.path().join("store.toml");
    fs::write(&path, SLED_CONFIG).unwrap();
    path
}

async fn run(ctx: &CliContext, args: &[&str]) -> String {
    let cli = Cli::try_parse_from(std::iter::once("syncstore").chain(args.iter().copied())).unwrap();
    ctx.execute(&cli.command, cli.user.as_deref(), cli.node.as_deref())
        .await
        .unwrap()
}

#[tokio::test]
async fn records_survive_reopening_the_store() {
    let root = TempDir::new().unwrap();
    let config = write_config(&root);

    {
        let ctx = CliContext::new(root.path().to_path_buf(), Some(config.clone())).unwrap();
        run(&ctx, &["create", "notes", r#"{"id": "n1", "text": "hello"}"#]).await;
        run(&ctx, &["update", "notes", r#"{"id": "n1", "pinned": true}"#]).await;
        ctx.core().flush().await.unwrap();
    }
    assert!(root.path().join("data").exists());

    let ctx = CliContext::new(root.path().to_path_buf(), Some(config)).unwrap();
    let read = run(&ctx, &["read", "notes", "n1"]).await;
    let record: serde_json::Value = serde_json::from_str(&read).unwrap();
    assert_eq!(record["text"], "hello");
    assert_eq!(record["pinned"], true);
    assert_eq!(run(&ctx, &["version", "notes"]).await, "2");

    let changes = run(&ctx, &["changes", "notes", "--since", "1", "--format", "json"]).await;
    let changes: serde_json::Value = serde_json::from_str(&changes).unwrap();
    assert_eq!(changes["changes"][0]["type"], "changed");
    assert_eq!(changes["changes"][0]["id"], "n1");
}

#[tokio::test]
async fn ids_honour_filter_and_paging() {
    let root = TempDir::new().unwrap();
    let config = write_config(&root);
    let ctx = CliContext::new(root.path().to_path_buf(), Some(config)).unwrap();
    for (id, tag) in [("a", "red"), ("b", "blue"), ("c", "red")] {
        let record = format!(r#"{{"id": "{}", "tag": "{}"}}"#, id, tag);
        run(&ctx, &["create", "notes", &record]).await;
    }

    let listed = run(
        &ctx,
        &[
            "ids", "notes", "--filter", r#"{"tag": "^red$"}"#, "--order", "id:desc", "--count",
            "1", "--format", "json",
        ],
    )
    .await;
    let listed: serde_json::Value = serde_json::from_str(&listed).unwrap();
    assert_eq!(listed["ids"], serde_json::json!(["c"]));
}

#[tokio::test]
async fn undeclared_channel_is_rejected() {
    let root = TempDir::new().unwrap();
    let config = write_config(&root);
    let ctx = CliContext::new(root.path().to_path_buf(), Some(config)).unwrap();
    let cli = Cli::try_parse_from(["syncstore", "version", "missing"]).unwrap();
    let err = ctx.execute(&cli.command, None, None).await.unwrap_err();
    assert!(err.to_string().contains("missing"));
    assert!(matches!(cli.command, Commands::Version { .. }));
}
