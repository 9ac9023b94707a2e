//! `qrc` command line client.
//!
//! Sends a command to a Core and prints the JSON result, or watches the
//! connection and prints what the Core reports.

mod cli;

use std::{process::ExitCode, time::Duration};

use clap::Parser;
use cli::{Cli, Command};
use qrc::{
    ClientError,
    CoreAddress,
    Credentials,
    ErrorCode,
    QrcClient,
    Request,
    client::StatusEvent,
};
use serde_json::{Value, json};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let address: CoreAddress = match cli.core.parse() {
        Ok(address) => address,
        Err(err) => {
            eprintln!("invalid --core {:?}: {err}", cli.core);
            return ExitCode::from(2);
        }
    };

    if let Some(addr) = cli.metrics_addr {
        install_metrics(addr);
    }

    let mut builder = QrcClient::builder(address).request_timeout(Duration::from_secs(cli.timeout));
    if let (Some(user), Some(password)) = (cli.user, cli.password) {
        builder = builder.credentials(Credentials::new(user, password));
    }
    let client = builder.build();

    let outcome = run(&client, cli.command).await;
    client.shutdown().await;
    match outcome {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(client: &QrcClient, command: Command) -> Result<ExitCode, ClientError> {
    match command {
        Command::Call { method, params } => {
            let mut request = Request::new(method);
            if let Some(raw) = params {
                match serde_json::from_str::<Value>(&raw) {
                    Ok(params) => request = request.with_params(params),
                    Err(err) => {
                        eprintln!("params are not valid JSON: {err}");
                        return Ok(ExitCode::from(2));
                    }
                }
            }
            print_json(&client.send(request).await?);
        }
        Command::Components => {
            let result = client.send(Request::new("Component.GetComponents")).await?;
            for component in result.as_array().into_iter().flatten() {
                println!(
                    "{}\t{}",
                    component["Name"].as_str().unwrap_or_default(),
                    component["Type"].as_str().unwrap_or_default()
                );
            }
        }
        Command::Controls { name } => {
            let request = Request::new("Component.GetControls").with_params(json!({"Name": name}));
            match client.send(request).await {
                Ok(result) => print_json(&result),
                Err(err)
                    if err
                        .protocol()
                        .is_some_and(|e| e.kind() == ErrorCode::UnknownComponentName) =>
                {
                    eprintln!("component {name:?} not found");
                    return Ok(ExitCode::from(3));
                }
                Err(err) => return Err(err),
            }
        }
        Command::Watch => watch(client).await?,
    }
    Ok(ExitCode::SUCCESS)
}

async fn watch(client: &QrcClient) -> Result<(), ClientError> {
    client.register_status("cli", |event: StatusEvent<'_>| match event.error {
        Some(err) => eprintln!("status: {:?} ({err})", event.status),
        None => eprintln!("status: {:?}", event.status),
    });
    let mut changes = client.subscribe_changes();
    let mut notifications = client.subscribe_notifications();
    let mut engine = client.engine_status();
    client.get_connection().await?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            Ok(()) = engine.changed() => {
                if let Some(status) = engine.borrow_and_update().as_ref() {
                    println!(
                        "engine: {:?} {}",
                        status.state,
                        status.design_name.as_deref().unwrap_or("-")
                    );
                }
            }
            Ok(change) = changes.recv() => {
                println!("change: {} = {} ({})", change.name, change.value, change.string);
            }
            Ok(notification) = notifications.recv() => {
                println!("{}: {}", notification.method, notification.params);
            }
        }
    }
    Ok(())
}

fn print_json(value: &Value) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(_) => println!("{value}"),
    }
}

#[cfg(feature = "metrics")]
fn install_metrics(addr: std::net::SocketAddr) {
    if let Err(err) = metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
    {
        tracing::warn!(error = %err, "failed to install metrics exporter");
    }
}

#[cfg(not(feature = "metrics"))]
fn install_metrics(_addr: std::net::SocketAddr) {
    tracing::warn!("built without the metrics feature; --metrics-addr ignored");
}
