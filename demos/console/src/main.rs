//! Minimal interactive console wired to the shell driver.
//!
//! Run with: cargo run -p console-example [-- command [args...]]
//!
//! Input lines are gathered until parentheses, quotes and braces balance,
//! then executed as one block. Ctrl+C interrupts the command in flight
//! instead of the console; a blank line submits an unbalanced block as-is.

use std::io::Write;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use virtuoso_shell_core::code::check_balance;
use virtuoso_shell_session::{PtyConnector, RunOutcome, ShellConfig, ShellDriver};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let mut config = ShellConfig::default();
    let mut overrides = std::env::args().skip(1);
    if let Some(command) = overrides.next() {
        config.command = command;
        config.args = overrides.collect();
    }

    let connector = Box::new(PtyConnector::new(config.clone()));
    let mut driver = ShellDriver::start(connector, config.clone()).await?;

    match driver.banner().await {
        Ok(banner) if !banner.is_empty() => println!("{banner}"),
        Ok(_) => {}
        Err(e) => tracing::debug!("banner probe failed: {e}"),
    }
    println!(":quit leaves, :help <name> shows a signature, :complete <prefix> lists matches");

    // SIGINT is consumed here for the lifetime of the console so that Ctrl+C
    // reaches the in-flight command, never the console itself.
    let (sigint_tx, mut sigint_rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if sigint_tx.send(()).is_err() {
                break;
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut pending = String::new();
    loop {
        let prompt = if pending.is_empty() {
            &config.primary_prompt
        } else {
            &config.continuation_prompt
        };
        print!("{prompt}");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };

        if pending.is_empty() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            if trimmed == ":quit" {
                break;
            }
            if trimmed == ":restart" {
                driver.shutdown(true).await?;
                println!("restarted");
                continue;
            }
            if let Some(token) = trimmed.strip_prefix(":help ") {
                let text = driver.inspect_styled(token.trim()).await?;
                if text.is_empty() {
                    println!("nothing known about {}", token.trim());
                } else {
                    println!("{text}");
                }
                continue;
            }
            if let Some(prefix) = trimmed.strip_prefix(":complete ") {
                println!("{}", driver.complete(prefix.trim()).await?.join("  "));
                continue;
            }
        }

        let submit_as_is = !pending.is_empty() && line.trim().is_empty();
        pending.push_str(&line);
        pending.push('\n');
        if !submit_as_is && check_balance(&pending).is_err() {
            continue;
        }

        let source = std::mem::take(&mut pending);
        while sigint_rx.try_recv().is_ok() {}
        let interrupt = driver.interrupt_handle()?;
        let run = driver.run(&source);
        tokio::pin!(run);
        let outcome = loop {
            tokio::select! {
                result = &mut run => break result,
                Some(()) = sigint_rx.recv() => interrupt.interrupt(),
            }
        };

        match outcome {
            Ok(outcome) => {
                if !outcome.output().is_empty() {
                    println!("{}", outcome.output());
                }
                match outcome {
                    RunOutcome::Failed { error, .. } => eprintln!("{error}"),
                    RunOutcome::Aborted { .. } => eprintln!("interrupted"),
                    RunOutcome::Done { .. } => {}
                }
            }
            Err(err) => eprintln!("{err}"),
        }
    }

    driver.shutdown(false).await?;
    Ok(())
}
