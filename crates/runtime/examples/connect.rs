//! Quick test of tool-server aggregation.
//!
//! Run with: cargo run --example connect -- <command> [args...]
//!
//! Connects the given MCP server, prints the tools it contributes to a
//! fresh registry, and invokes the first one with empty arguments.

use std::collections::HashMap;

use policy::LaunchPolicy;
use runtime::{LaunchSpec, ToolRegistry, ToolServer};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let command = args.next().unwrap_or_else(|| "mcp-server-filesystem".to_string());

    let spec = LaunchSpec {
        name: "demo".to_string(),
        command,
        args: args.collect(),
        env: HashMap::new(),
        secret_env: HashMap::new(),
    };

    println!("Connecting {} {:?}...", spec.command, spec.args);
    let server = ToolServer::connect(spec, &LaunchPolicy::permissive()).await?;

    let registry = ToolRegistry::new();
    let count = server.register(&registry).await;
    println!("Registered {count} tools:");

    let snapshot = registry.snapshot();
    let mut specs = snapshot.specs();
    specs.sort_by(|a, b| a.name.cmp(&b.name));
    for spec in &specs {
        println!("  - {}: {}", spec.name, spec.description.lines().next().unwrap_or_default());
    }

    if let Some(first) = specs.first() {
        println!("\nInvoking {} with empty arguments...", first.name);
        match snapshot
            .get(&first.name)
            .expect("spec came from this snapshot")
            .invoke(serde_json::json!({}))
            .await
        {
            Ok(output) => println!("Output: {output}"),
            Err(e) => println!("Failed: {e}"),
        }
    }

    server.close().await;
    Ok(())
}
