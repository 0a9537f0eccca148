use partition_raft::{NodeConfig, ServiceTypeRegistry};
use slog::Drain;
use std::error::Error;

/// Runs one partition member until Ctrl-C.
///
/// Usage: `partition-raft <node.toml>`
#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let path = std::env::args()
        .nth(1)
        .ok_or("usage: partition-raft <node.toml>")?;
    let config = NodeConfig::from_file(&path)?;
    let logger = create_root_logger_for_stdout(config.member.clone());

    let mut service_types = ServiceTypeRegistry::new();
    partition_raft::register_builtins(&mut service_types);

    let partition_config = config.into_partition_config(logger.clone(), service_types)?;
    let client = partition_raft::create_partition(partition_config).await?;

    let mut roles = client.role_listener().await?;
    let role_logger = logger.clone();
    tokio::spawn(async move {
        while let Some(state) = roles.next().await {
            slog::info!(
                role_logger,
                "Now {:?} in term {:?} (leader: {:?})",
                state.role,
                state.term,
                state.leader
            );
        }
    });

    tokio::signal::ctrl_c().await?;
    slog::info!(logger, "Shutting down");
    client.shutdown().await?;
    Ok(())
}

fn create_root_logger_for_stdout(member: String) -> slog::Logger {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).use_file_location().build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();

    slog::Logger::root(drain, slog::o!("Member" => member))
}
