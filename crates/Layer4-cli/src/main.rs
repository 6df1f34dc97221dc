//! nexec CLI - Main entry point

mod cli;
mod logging;

use nexec_core::{
    builtin_namespace, DescriptorResolver, ProtocolLoader, Runner, TerminalProgress,
};
use nexec_foundation::{first_run_setup, NexecConfig, NexecPaths};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let paths = NexecPaths::discover()?;
    let config = match first_run_setup(&paths) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Warning: failed to load configuration, using defaults: {}", e);
            NexecConfig::default()
        }
    };

    // Protocols are discovered before parsing so each can add its own subcommand
    let resolver = DescriptorResolver::new(vec![Arc::new(builtin_namespace())]);
    let loader = ProtocolLoader::new();
    let mut failed_protocols = Vec::new();
    let handles: Vec<_> = resolver
        .discover_protocols()
        .values()
        .filter_map(|descriptor| match loader.load(descriptor) {
            Ok(handle) => Some(handle),
            Err(e) => {
                failed_protocols.push((descriptor.name.clone(), e));
                None
            }
        })
        .collect();

    let mut command = cli::build_command(&config, &handles, &loader);
    let matches = command.get_matches_mut();
    let invocation = cli::parse_invocation(&matches, &config)?;
    logging::init(&invocation.args, &config, &paths)?;

    for (name, e) in failed_protocols {
        debug!(protocol = %name, "Protocol unavailable: {}", e);
    }

    let args = invocation.args;
    let Some(protocol) = args.protocol.clone() else {
        command.print_help()?;
        return Ok(());
    };

    let mut runner = Runner::new(resolver, paths, config);
    if !args.no_progress {
        runner = runner.with_progress(Arc::new(TerminalProgress::new()));
    }

    if args.list_modules {
        print!("{}", runner.list_modules());
        return Ok(());
    }
    if args.show_module_options {
        if args.modules.is_empty() {
            warn!("[-] --options requires at least one module (-M)");
            return Ok(());
        }
        print!("{}", runner.module_options(&args.modules)?);
        return Ok(());
    }
    if invocation.show_results {
        for line in runner.protocol_results(&protocol)? {
            println!("{}", line);
        }
        return Ok(());
    }

    let shutdown = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    match runner.execute_until(args, shutdown).await {
        Ok(summary) if summary.interrupted => {
            warn!("Run of {} interrupted", summary.protocol);
            Ok(())
        }
        Ok(summary) => {
            info!(
                "Finished {}: {} succeeded, {} failed",
                summary.protocol,
                summary.succeeded(),
                summary.failed()
            );
            Ok(())
        }
        Err(e) => {
            error!("[-] {}", e);
            std::process::exit(1);
        }
    }
}
