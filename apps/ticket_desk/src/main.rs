mod commands;
mod render;

use std::{path::PathBuf, sync::Arc};

use anyhow::Result;
use clap::Parser;
use client_core::{config::load_settings, SessionCoordinator, TicketLinks};
use shared::domain::TokenId;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::broadcast::error::RecvError,
};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::commands::DeskCommand;

#[derive(Parser, Debug)]
struct Args {
    /// Settings file; defaults to ./ticketing.toml when present.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    wallet_url: Option<String>,
    #[arg(long)]
    rpc_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    let mut settings = load_settings(args.config.as_deref());
    if let Some(wallet_url) = args.wallet_url {
        settings.wallet_url = Some(wallet_url);
    }
    if let Some(rpc_url) = args.rpc_url {
        settings.chain_rpc_url = rpc_url;
    }
    let config = settings.validate()?;
    info!(
        "desk: starting contract={} rpc={} wallet={}",
        config.contract_address,
        config.chain_rpc_url,
        config
            .wallet_url
            .as_ref()
            .map(|url| url.as_str())
            .unwrap_or("none")
    );

    let client = SessionCoordinator::from_config(&config)?;
    spawn_printer(&client);
    println!("{}", render::HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match DeskCommand::parse(&line) {
            Ok(None) => {}
            Ok(Some(DeskCommand::Quit)) => break,
            Ok(Some(command)) => dispatch(&client, &config.ticket_links, command),
            Err(err) => println!("{err}"),
        }
    }

    client.disconnect().await;
    Ok(())
}

fn dispatch(client: &Arc<SessionCoordinator>, links: &TicketLinks, command: DeskCommand) {
    debug!(command = ?command, "desk: dispatching command");
    match command {
        DeskCommand::Help => println!("{}", render::HELP),
        DeskCommand::Status => println!("{}", render::status(&client.view())),
        DeskCommand::Link { token_id } => match TokenId::new(&token_id) {
            Ok(token_id) => {
                if !client.view().contains_token(&token_id) {
                    println!("token {token_id} is not in the owned list");
                }
                println!("{}", links.link_for(&token_id));
            }
            Err(err) => println!("{err}"),
        },
        DeskCommand::Quit => {}
        action => {
            // Failures reach the prompt through the event stream.
            let client = Arc::clone(client);
            tokio::spawn(async move {
                let outcome = match action {
                    DeskCommand::Connect => client.establish_session().await.map(drop),
                    DeskCommand::Disconnect => {
                        client.disconnect().await;
                        Ok(())
                    }
                    DeskCommand::Refresh => client.refresh_owned_tokens().await.map(drop),
                    DeskCommand::Mint {
                        token_id,
                        metadata_hash,
                    } => client.mint_token(&token_id, &metadata_hash).await.map(drop),
                    DeskCommand::Metadata { token_id } => {
                        client.fetch_metadata(&token_id).await.map(drop)
                    }
                    DeskCommand::Update {
                        token_id,
                        metadata_hash,
                    } => client
                        .update_metadata(&token_id, &metadata_hash)
                        .await
                        .map(drop),
                    DeskCommand::Help
                    | DeskCommand::Status
                    | DeskCommand::Link { .. }
                    | DeskCommand::Quit => Ok(()),
                };
                if let Err(err) = outcome {
                    debug!("desk: action finished with error: {err}");
                }
            });
        }
    }
}

fn spawn_printer(client: &Arc<SessionCoordinator>) {
    let mut events = client.subscribe_events();
    let mut view = client.subscribe_view();
    tokio::spawn(async move {
        let mut last_summary = render::view_summary(&view.borrow());
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Ok(event) => println!("{}", render::event_line(&event)),
                    Err(RecvError::Lagged(skipped)) => {
                        debug!("desk: event printer lagged skipped={skipped}");
                    }
                    Err(RecvError::Closed) => break,
                },
                changed = view.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let summary = render::view_summary(&view.borrow_and_update());
                    if summary != last_summary {
                        println!("{summary}");
                        last_summary = summary;
                    }
                }
            }
        }
    });
}
