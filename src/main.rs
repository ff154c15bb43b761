use clap::{ArgAction, Parser};
use sql_slot_pool::{ConnectionArgs, Database, QueryDocument};
use tracing::Level;

/// Lists the tables of the configured database when no query is given.
const DEFAULT_QUERY: &str = "SELECT TABLE_SCHEMA, TABLE_NAME FROM INFORMATION_SCHEMA.TABLES \
                             WHERE TABLE_TYPE = 'BASE TABLE' ORDER BY TABLE_SCHEMA, TABLE_NAME";

#[derive(Parser, Debug)]
#[command(author, version, about = "Warm up a slot pool and run queries through it")]
struct Args {
    #[command(flatten)]
    connection: ConnectionArgs,

    /// Query to run; repeat to run several in order
    #[arg(long = "query", short = 'q')]
    queries: Vec<String>,

    /// -v for debug, -vv for trace
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = Args::parse();
    let level = match args.verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_max_level(level)
        .init();

    let db = Database::from_args(args.connection)
        .await
        .unwrap_or_else(|err| {
            tracing::error!(error = %err, "failed to start database layer");
            std::process::exit(1);
        });

    let report = db.warm_up().await;
    print_json(&report);

    let queries = if args.queries.is_empty() {
        vec![DEFAULT_QUERY.to_string()]
    } else {
        args.queries
    };
    for query in &queries {
        let document = QueryDocument::from(db.execute_query(query, None).await);
        print_json(&document);
    }
    tracing::info!(stats = ?db.stats(), "done");
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(err) => tracing::error!(error = %err, "failed to serialize output"),
    }
}
