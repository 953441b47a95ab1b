use std::path::PathBuf;

use {
    anyhow::{Context, Result, bail},
    clap::{Args, Parser, Subcommand},
    fieldgate_config::FieldgateConfig,
    fieldgate_graphql::{GatewayClient, SubscriptionEvent},
    futures::StreamExt,
    serde_json::{Map, Value},
    tracing::{debug, info},
};

/// GraphQL proxy and SSE subscription relay for the fieldgate monitoring UI.
///
/// Without a subcommand the gateway is started with the discovered config.
#[derive(Parser, Debug)]
#[command(name = "fieldgate", version)]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true, env = "FIELDGATE_LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the gateway.
    Serve(ServeArgs),
    /// Send a query or mutation through a running gateway and print the envelope.
    Query(QueryArgs),
    /// Open a subscription through a running gateway and print each event.
    Subscribe(SubscribeArgs),
}

#[derive(Args, Debug, Default)]
struct ServeArgs {
    /// Path to a TOML config file (defaults to ./fieldgate.toml when present).
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Address to bind the HTTP server to.
    #[arg(long)]
    bind: Option<String>,

    /// Port to listen on.
    #[arg(long)]
    port: Option<u16>,

    /// Upstream GraphQL endpoint (overrides GRAPHQL_URL).
    #[arg(long)]
    graphql_url: Option<String>,
}

#[derive(Args, Debug)]
struct QueryArgs {
    /// GraphQL document.
    query: String,

    /// Variables as a JSON object.
    #[arg(long)]
    variables: Option<String>,

    /// Gateway root URL.
    #[arg(long, env = "FIELDGATE_GATEWAY", default_value = "http://localhost:3012")]
    gateway: String,
}

#[derive(Args, Debug)]
struct SubscribeArgs {
    #[command(flatten)]
    query: QueryArgs,

    /// SSE event names carrying subscription data. Defaults to
    /// `upstream.subscription_events` from the config.
    #[arg(long, value_delimiter = ',')]
    events: Option<Vec<String>>,

    /// Path to a TOML config file (defaults to ./fieldgate.toml when present).
    #[arg(long, short)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        None => serve(ServeArgs::default()).await,
        Some(Command::Serve(args)) => serve(args).await,
        Some(Command::Query(args)) => query(args).await,
        Some(Command::Subscribe(args)) => subscribe(args).await,
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

// ── serve ────────────────────────────────────────────────────────────────────

async fn serve(args: ServeArgs) -> Result<()> {
    let mut config = fieldgate_config::discover_and_load(args.config.as_deref())
        .context("failed to load configuration")?;
    apply_overrides(&mut config, &args);
    config.validate().context("invalid configuration")?;
    debug!(?config, "effective configuration");

    fieldgate_gateway::start_gateway(&config).await
}

fn apply_overrides(config: &mut FieldgateConfig, args: &ServeArgs) {
    if let Some(bind) = &args.bind {
        config.server.bind.clone_from(bind);
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(url) = &args.graphql_url {
        config.upstream.endpoint.clone_from(url);
    }
}

// ── query / subscribe ────────────────────────────────────────────────────────

fn parse_variables(raw: Option<&str>) -> Result<Option<Map<String, Value>>> {
    let Some(raw) = raw.filter(|r| !r.trim().is_empty()) else {
        return Ok(None);
    };
    match serde_json::from_str::<Value>(raw).context("--variables is not valid JSON")? {
        Value::Object(map) => Ok(Some(map)),
        other => bail!("--variables must be a JSON object, got {other}"),
    }
}

fn client_for(gateway: &str) -> Result<GatewayClient> {
    let base = gateway
        .parse()
        .with_context(|| format!("invalid gateway url: {gateway}"))?;
    Ok(GatewayClient::new(base))
}

async fn query(args: QueryArgs) -> Result<()> {
    let variables = parse_variables(args.variables.as_deref())?;
    let client = client_for(&args.gateway)?;

    let envelope = client.query(&args.query, variables).await?;
    println!("{}", serde_json::to_string_pretty(&envelope)?);
    if envelope.has_errors() {
        bail!(
            "query returned errors: {}",
            envelope.first_error_message().unwrap_or("unknown error")
        );
    }
    Ok(())
}

fn subscription_events(args: &SubscribeArgs) -> Result<Vec<String>> {
    if let Some(events) = &args.events {
        return Ok(events.clone());
    }
    let config = fieldgate_config::discover_and_load(args.config.as_deref())
        .context("failed to load configuration")?;
    Ok(config.upstream.subscription_events)
}

async fn subscribe(args: SubscribeArgs) -> Result<()> {
    let variables = parse_variables(args.query.variables.as_deref())?;
    let events = subscription_events(&args)?;
    let client = client_for(&args.query.gateway)?.with_data_events(events);

    let mut events = client
        .subscribe(&args.query.query, variables.as_ref())
        .await?;
    info!(gateway = %args.query.gateway, "subscribed");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, closing subscription");
                return Ok(());
            }
            next = events.next() => match next {
                Some(Ok(SubscriptionEvent::Data(envelope))) => {
                    println!("{}", serde_json::to_string(&envelope)?);
                },
                Some(Ok(SubscriptionEvent::Error(envelope))) => {
                    bail!(
                        "subscription failed: {}",
                        envelope.first_error_message().unwrap_or("unknown error")
                    );
                },
                Some(Err(e)) => return Err(e.into()),
                None => {
                    info!("subscription closed by gateway");
                    return Ok(());
                },
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn no_subcommand_means_serve() {
        let cli = Cli::try_parse_from(["fieldgate"]).unwrap();
        assert!(cli.command.is_none());
        assert!(!cli.log_json);
    }

    #[test]
    fn serve_flags_override_config() {
        let cli = Cli::try_parse_from([
            "fieldgate",
            "serve",
            "--port",
            "8088",
            "--graphql-url",
            "http://core:4000/graphql",
        ])
        .unwrap();
        let Some(Command::Serve(args)) = cli.command else {
            panic!("expected serve");
        };

        let mut config = FieldgateConfig::default();
        apply_overrides(&mut config, &args);
        assert_eq!(config.server.port, 8088);
        assert_eq!(config.server.bind, fieldgate_config::DEFAULT_BIND);
        assert_eq!(config.upstream.endpoint, "http://core:4000/graphql");
    }

    #[test]
    fn flag_fixes_invalid_configured_endpoint() {
        let cli = Cli::try_parse_from([
            "fieldgate",
            "serve",
            "--graphql-url",
            "http://core:4000/graphql",
        ])
        .unwrap();
        let Some(Command::Serve(args)) = cli.command else {
            panic!("expected serve");
        };

        let mut config = FieldgateConfig::default();
        config.upstream.endpoint = "not a url".into();
        assert!(config.validate().is_err());

        apply_overrides(&mut config, &args);
        config.validate().unwrap();
    }

    #[test]
    fn subscribe_events_default_to_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fieldgate.toml");
        std::fs::write(&path, "[upstream]\nsubscription_events = [\"data\"]\n").unwrap();

        let cli = Cli::try_parse_from([
            "fieldgate",
            "subscribe",
            "subscription { tick }",
            "--config",
            path.to_str().unwrap(),
        ])
        .unwrap();
        let Some(Command::Subscribe(args)) = cli.command else {
            panic!("expected subscribe");
        };
        assert!(args.events.is_none());
        assert_eq!(subscription_events(&args).unwrap(), ["data"]);
    }

    #[test]
    fn subscribe_events_are_comma_separated() {
        let cli = Cli::try_parse_from([
            "fieldgate",
            "subscribe",
            "subscription { tick }",
            "--events",
            "next,data",
        ])
        .unwrap();
        let Some(Command::Subscribe(args)) = cli.command else {
            panic!("expected subscribe");
        };
        assert_eq!(args.events, Some(vec!["next".to_string(), "data".to_string()]));
        assert_eq!(subscription_events(&args).unwrap(), ["next", "data"]);
        assert_eq!(args.query.query, "subscription { tick }");
    }

    #[test]
    fn variables_must_be_an_object() {
        assert!(parse_variables(None).unwrap().is_none());
        assert!(parse_variables(Some("  ")).unwrap().is_none());
        let vars = parse_variables(Some(r#"{"id":"plc-1"}"#)).unwrap().unwrap();
        assert_eq!(vars["id"], "plc-1");
        assert!(parse_variables(Some("[1,2]")).is_err());
        assert!(parse_variables(Some("{oops")).is_err());
    }
}
