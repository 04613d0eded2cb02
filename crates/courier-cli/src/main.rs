use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Duration, Utc};
use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use courier_core::app::{Publisher, PublisherBuilder};
use courier_core::config::PublisherConfig;
use courier_core::domain::{
    ConnectorKind, ElementId, FormDefinition, FormElement, FormId, PublicationMode, Row,
    Submission, SubmissionKey,
};
use courier_core::impls::{
    InMemoryCursorStore, InMemorySubmissionSource, InMemoryTaskLock, JsonServerConnectorFactory,
    MemoryConnector, MemoryConnectorFactory,
};
use courier_core::ports::{Clock, SystemClock};

/// Replicate a seeded form to one destination and print its operator summary.
#[derive(Debug, Parser)]
#[command(name = "courier", version)]
struct Args {
    /// Optional TOML / JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Publish to this JSON server instead of the in-memory sink
    #[arg(long)]
    json_url: Option<String>,

    #[arg(long, requires = "json_url")]
    json_token: Option<String>,

    /// Number of historical submissions to seed
    #[arg(long, default_value_t = 5)]
    submissions: usize,

    #[arg(long, value_enum, default_value_t = Mode::UploadAndStream)]
    mode: Mode,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    UploadOnly,
    StreamOnly,
    UploadAndStream,
}

impl From<Mode> for PublicationMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::UploadOnly => PublicationMode::UploadOnly,
            Mode::StreamOnly => PublicationMode::StreamOnly,
            Mode::UploadAndStream => PublicationMode::UploadAndStream,
        }
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "courier=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn demo_form(form_id: &FormId) -> FormDefinition {
    let element = |id: &str, columns: &[&str]| FormElement {
        id: ElementId::new(id),
        name: id.into(),
        columns: columns.iter().map(|c| c.to_string()).collect(),
    };
    FormDefinition {
        form_id: form_id.clone(),
        title: "Household survey".into(),
        top_level: element("household", &["village", "size"]),
        repeat_groups: vec![element("members", &["name", "age"])],
    }
}

fn demo_submission(n: usize, completed_at: chrono::DateTime<Utc>) -> Submission {
    let key = SubmissionKey::new(format!("uuid:demo-{n:04}"));
    let mut household = serde_json::Map::new();
    household.insert("village".into(), format!("village-{}", n % 3).into());
    household.insert("size".into(), (n % 4 + 1).into());

    let mut rows = vec![Row {
        submission: key.clone(),
        element: ElementId::new("household"),
        values: household,
    }];
    for m in 0..(n % 4 + 1) {
        let mut member = serde_json::Map::new();
        member.insert("name".into(), format!("member-{n}-{m}").into());
        member.insert("age".into(), (20 + m * 7).into());
        rows.push(Row {
            submission: key.clone(),
            element: ElementId::new("members"),
            values: member,
        });
    }
    Submission {
        key,
        completed_at,
        rows,
    }
}

fn build(
    args: &Args,
    config: PublisherConfig,
    submissions: Arc<InMemorySubmissionSource>,
    clock: Arc<dyn Clock>,
) -> Result<(Publisher, ConnectorKind), Box<dyn std::error::Error>> {
    let task_lock = InMemoryTaskLock::new(
        Duration::from_std(config.lock.ttl())?,
        clock.clone(),
    );
    let builder = PublisherBuilder::new()
        .store(Arc::new(InMemoryCursorStore::new()))
        .task_lock(Arc::new(task_lock))
        .submissions(submissions)
        .clock(clock)
        .config(config);

    let (builder, kind) = if args.json_url.is_some() {
        let factory = JsonServerConnectorFactory::new()?;
        (builder.register_connector(Arc::new(factory))?, ConnectorKind::JsonServer)
    } else {
        let factory = MemoryConnectorFactory::new(
            ConnectorKind::GoogleSpreadsheet,
            MemoryConnector::new("demo"),
        );
        (builder.register_connector(Arc::new(factory))?, ConnectorKind::GoogleSpreadsheet)
    };
    let publisher = builder.expect_kinds(&[kind]).build()?;
    Ok((publisher, kind))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let args = Args::parse();

    let config = PublisherConfig::load(args.config.as_deref())?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    // (A) form と過去の submission を用意
    let form_id = FormId::new("household-survey");
    let submissions = Arc::new(InMemorySubmissionSource::new());
    submissions.add_form(demo_form(&form_id)).await;
    let now = clock.now();
    for n in 0..args.submissions {
        let completed_at = now - Duration::minutes((args.submissions - n) as i64);
        submissions
            .add_submission(&form_id, demo_submission(n, completed_at))
            .await;
    }

    // (B) destination を作って prepare
    let (publisher, kind) = build(&args, config, submissions.clone(), clock.clone())?;
    let settings = match &args.json_url {
        Some(url) => serde_json::json!({ "url": url, "token": args.json_token }),
        None => serde_json::json!({}),
    };
    let record = publisher
        .create_destination(form_id.clone(), kind, args.mode.into(), settings)
        .await?;
    let status = publisher.initiate(record.id()).await?;
    info!(cursor_id = %record.id(), status = %status, "destination initiated");

    // (C) 新しい submission を 1 件流してから、残りを pass で流しきる
    submissions
        .add_submission(&form_id, demo_submission(args.submissions, clock.now()))
        .await;
    publisher.on_submission(&form_id).await?;
    let max_passes = publisher.config().sweep.max_batches_per_sweep;
    for _ in 0..max_passes {
        let pass = publisher.run_pass(record.id(), true).await?;
        if !pass.more {
            break;
        }
    }

    // (D) operator 向けの状態を出力
    let report = publisher.status_report(&form_id).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
