#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::time::Duration;

use assert_matches::assert_matches;

use kira_metadata_fetcher::config::RunSettings;
use kira_metadata_fetcher::domain::QueryStatus;
use kira_metadata_fetcher::edirect::EdirectSource;
use kira_metadata_fetcher::error::KiraError;
use kira_metadata_fetcher::output::JsonOutput;
use kira_metadata_fetcher::runner::QueryRunner;
use kira_metadata_fetcher::source::{MetadataSource, RetryPolicy, parse_hit_count};
use kira_metadata_fetcher::store::OutputLayout;

const ESEARCH: &str = r#"#!/bin/sh
# esearch -db sra -query QUERY
if [ "$4" = "outage" ]; then
    echo "esearch: backend unavailable" >&2
    exit 1
fi
if [ "$4" = "noisy" ]; then
    head -c 262144 /dev/zero | tr '\0' 'w' >&2
fi
printf '%s\n' "$4"
"#;

const EFETCH: &str = r#"#!/bin/sh
read query
if [ "$query" = "nothing" ]; then
    printf 'Run,spots,BioProject\n'
    exit 0
fi
printf 'Run,spots,BioProject\nSRR1,1200,PRJNA1\nSRR2,900,PRJNA1\n'
"#;

const XTRACT: &str = r#"#!/bin/sh
read query
case "$query" in
    huge) echo 250000 ;;
    *) echo 2 ;;
esac
"#;

fn install(dir: &Path, name: &str, script: &str) {
    let path = dir.join(name);
    fs::write(&path, script).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
}

// One test function so no other test thread forks while the scripts are
// still open for writing.
#[test]
fn edirect_pipeline_with_fake_tools() {
    let temp = tempfile::tempdir().unwrap();
    let bin = temp.path().join("bin");
    fs::create_dir(&bin).unwrap();
    install(&bin, "esearch", ESEARCH);
    install(&bin, "efetch", EFETCH);
    install(&bin, "xtract", XTRACT);

    let edirect = EdirectSource::discover_in(bin.as_os_str()).unwrap();
    let tools = edirect.tool_info();
    assert!(tools.esearch.ends_with("esearch"));
    assert!(tools.xtract.ends_with("xtract"));

    let raw = edirect.count("huge").unwrap().unwrap();
    assert_eq!(parse_hit_count(&raw), Some(250000));

    let destination = temp.path().join("direct.csv");
    edirect.fetch("gut", &destination).unwrap();
    assert_eq!(
        fs::read_to_string(&destination).unwrap(),
        "Run,spots,BioProject\nSRR1,1200,PRJNA1\nSRR2,900,PRJNA1\n"
    );

    // a quarter megabyte of warnings on esearch stderr must not stall the pipe
    let noisy = temp.path().join("noisy.csv");
    edirect.fetch("noisy", &noisy).unwrap();
    assert_eq!(fs::read_to_string(&noisy).unwrap().lines().count(), 3);

    let err = edirect.fetch("outage", &destination).unwrap_err();
    assert_matches!(err, KiraError::EdirectCommand(message) if message.contains("backend unavailable"));
    let err = edirect.count("outage").unwrap().unwrap_err();
    assert_matches!(err, KiraError::EdirectCommand(_));

    let queries = temp.path().join("sra_queries.tsv");
    fs::write(
        &queries,
        "query_id\tquery\nbig\thuge\ngut\tgut\nempty\tnothing\ndown\toutage\n",
    )
    .unwrap();
    let out_dir = temp.path().join("per_query");
    let runner = QueryRunner::new(
        edirect,
        OutputLayout::from_path(&out_dir).unwrap(),
        RunSettings {
            delay: Duration::ZERO,
            max_hits: Some(5000),
            retry: RetryPolicy {
                retries: 1,
                backoff: Duration::ZERO,
            },
        },
    );
    let report = runner.run(&queries, &JsonOutput).unwrap();

    let statuses: Vec<_> = report.outcomes.iter().map(|outcome| outcome.status).collect();
    assert_eq!(
        statuses,
        vec![
            QueryStatus::SkippedTooManyHits,
            QueryStatus::Success,
            QueryStatus::EmptyResult,
            QueryStatus::FetchFailed,
        ]
    );
    // the failing count is treated as 0 hits, so the fetch still runs
    assert_eq!(report.outcomes[3].hit_count, Some(0));
    let names: Vec<_> = fs::read_dir(&out_dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["gut.runinfo.csv"]);
}
