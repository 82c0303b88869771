use chrono::{DateTime, Duration, Utc};
use mvn_query::index::ArtifactRecord;
use mvn_query::index_data::{IndexDataWriter, uinfo_for};
use mvn_query::updater::format_remote_timestamp;
use std::path::Path;
use std::process::{Command, Output};

/// `g:a:v[:packaging[:classifier[:extension]]]`; the extension defaults to the packaging.
fn artifact(coordinates: &str, last_modified: i64) -> ArtifactRecord {
    let parts: Vec<&str> = coordinates.split(':').collect();
    let optional = |idx: usize| {
        parts
            .get(idx)
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
    };
    ArtifactRecord {
        group_id: parts[0].to_string(),
        artifact_id: parts[1].to_string(),
        version: parts[2].to_string(),
        packaging: optional(3),
        classifier: optional(4),
        extension: optional(5).or_else(|| optional(3)),
        last_modified,
    }
}

fn write_index_file(
    path: &Path,
    timestamp: DateTime<Utc>,
    records: &[ArtifactRecord],
) -> anyhow::Result<()> {
    let file = std::fs::File::create(path)?;
    let mut writer = IndexDataWriter::new(file, Some(timestamp))?;
    writer.write_document(&[("DESCRIPTOR", "NexusIndex"), ("IDXINFO", "1.0|central")])?;
    for record in records {
        writer.write_artifact(&uinfo_for(record), record)?;
    }
    writer.finish()?;
    Ok(())
}

/// Publishes a repository index under `<root>/.index` with the given chunks.
fn publish(
    root: &Path,
    timestamp: DateTime<Utc>,
    full: &[ArtifactRecord],
    chunks: &[(u32, Vec<ArtifactRecord>)],
) -> anyhow::Result<()> {
    let index_dir = root.join(".index");
    std::fs::create_dir_all(&index_dir)?;
    write_index_file(&index_dir.join("nexus-maven-repository-index.gz"), timestamp, full)?;

    let mut props = format!(
        "nexus.index.id=central\nnexus.index.chain-id=1318453614498\nnexus.index.timestamp={}\n",
        format_remote_timestamp(timestamp)
    );
    for (idx, (chunk, records)) in chunks.iter().enumerate() {
        write_index_file(
            &index_dir.join(format!("nexus-maven-repository-index.{chunk}.gz")),
            timestamp,
            records,
        )?;
        props.push_str(&format!("nexus.index.incremental-{idx}={chunk}\n"));
    }
    if let Some((last, _)) = chunks.last() {
        props.push_str(&format!("nexus.index.last-incremental={last}\n"));
    }
    std::fs::write(index_dir.join("nexus-maven-repository-index.properties"), props)?;
    Ok(())
}

fn run(data_dir: &Path, repo: &Path, extra: &[&str]) -> anyhow::Result<Output> {
    let bin = env!("CARGO_BIN_EXE_mvn-query");
    let repo_url = format!("file://{}", repo.display());
    let out = Command::new(bin)
        .arg("--config-data-dir")
        .arg(data_dir)
        .args(["--config-repo", repo_url.as_str()])
        .args(["-d", "0", "-g", "com.hazelcast", "-a", "hazelcast"])
        .args(extra)
        .env_remove("RUST_LOG")
        .output()?;
    if !out.status.success() {
        anyhow::bail!(
            "command failed: status={:?}, stderr={}",
            out.status.code(),
            String::from_utf8_lossy(&out.stderr)
        );
    }
    Ok(out)
}

fn central_snapshot() -> Vec<ArtifactRecord> {
    let recent = (Utc::now() - Duration::days(2)).timestamp_millis();
    vec![
        artifact("com.hazelcast:hazelcast:3.12.13:jar", recent),
        artifact("com.hazelcast:hazelcast:3.12.13:jar:tests", recent),
        artifact("com.hazelcast:hazelcast-client:3.12.13:jar", recent),
        artifact("com.hazelcast:hazelcast:3.12.12:pom", recent),
        artifact("com.hazelcast:hazelcast:3.12.11:bundle::jar", recent),
    ]
}

#[test]
fn full_update_then_skip_then_forced_incremental() -> anyhow::Result<()> {
    let data = tempfile::tempdir()?;
    let repo = tempfile::tempdir()?;
    let published = Utc::now() - Duration::hours(1);
    publish(repo.path(), published, &central_snapshot(), &[(1, Vec::new())])?;

    let first = run(data.path(), repo.path(), &[])?;
    let info = String::from_utf8(first.stderr)?;
    let result = String::from_utf8(first.stdout)?;
    assert!(info.contains("Full update happened!"), "{info}");
    assert!(info.contains("+g:com.hazelcast +a:hazelcast +e:jar"), "{info}");
    assert!(!info.contains("Skipping index update"));
    assert!(result.contains("com.hazelcast:hazelcast:3.12.13:jar:\n"));
    assert!(result.contains("com.hazelcast:hazelcast:3.12.13:jar:tests\n"));
    assert!(result.contains("com.hazelcast:hazelcast:3.12.11:bundle:\n"));
    assert!(!result.contains("hazelcast-client"));
    assert!(!result.contains(":pom:"));

    let repo_key = std::fs::read_dir(data.path())?
        .next()
        .ok_or_else(|| anyhow::anyhow!("no repository directory created"))??
        .path();
    let props = std::fs::read_to_string(repo_key.join("index.properties"))?;
    assert!(props.contains("last.update.timestamp="));
    assert!(props.contains("update.interval.hours=48"));
    assert!(repo_key.join("index.lmdb").is_file());

    let second = run(data.path(), repo.path(), &["--skip-update", "-c", ""])?;
    let info = String::from_utf8(second.stderr)?;
    let result = String::from_utf8(second.stdout)?;
    assert!(info.contains("Skipping index update"), "{info}");
    assert_eq!(
        result,
        "com.hazelcast:hazelcast:3.12.11:bundle:\ncom.hazelcast:hazelcast:3.12.13:jar:\n"
    );

    let newer = Utc::now();
    let fresh = artifact("com.hazelcast:hazelcast:5.3.0:jar", newer.timestamp_millis());
    publish(
        repo.path(),
        newer,
        &central_snapshot(),
        &[(1, Vec::new()), (2, vec![fresh])],
    )?;
    let third = run(data.path(), repo.path(), &["--force-update", "-c", ""])?;
    let info = String::from_utf8(third.stderr)?;
    let result = String::from_utf8(third.stdout)?;
    assert!(!info.contains("Skipping index update"));
    assert!(info.contains("Incremental update happened"), "{info}");
    assert!(result.contains("com.hazelcast:hazelcast:5.3.0:jar:\n"));
    assert!(result.contains("com.hazelcast:hazelcast:3.12.13:jar:\n"));
    Ok(())
}

#[test]
fn timestamps_render_in_iso() -> anyhow::Result<()> {
    let data = tempfile::tempdir()?;
    let repo = tempfile::tempdir()?;
    let record = artifact("com.hazelcast:hazelcast:4.0:jar", 1_700_000_000_000);
    publish(repo.path(), Utc::now(), &[record], &[])?;

    let out = run(
        data.path(),
        repo.path(),
        &["-q", "-t", "--timestamp-format", "iso"],
    )?;
    assert_eq!(
        String::from_utf8(out.stdout)?,
        "com.hazelcast:hazelcast:4.0:jar::2023-11-14T22:13:20.000Z\n"
    );
    assert!(!String::from_utf8(out.stderr)?.contains("Full update happened!"));
    Ok(())
}

#[test]
fn help_and_usage_errors_exit_with_two() -> anyhow::Result<()> {
    let bin = env!("CARGO_BIN_EXE_mvn-query");
    for args in [&["--help"][..], &["--no-such-flag"][..]] {
        let out = Command::new(bin).args(args).output()?;
        assert_eq!(out.status.code(), Some(2), "{args:?}");
    }

    let out = Command::new(bin).arg("--version").output()?;
    assert_eq!(out.status.code(), Some(0));
    assert!(String::from_utf8(out.stderr)?.starts_with("mvn-query version "));
    Ok(())
}

#[test]
fn unreachable_repository_fails_with_status_one() -> anyhow::Result<()> {
    let data = tempfile::tempdir()?;
    let repo = tempfile::tempdir()?;
    let out = Command::new(env!("CARGO_BIN_EXE_mvn-query"))
        .arg("--config-data-dir")
        .arg(data.path())
        .arg("--config-repo")
        .arg(format!("file://{}", repo.path().join("missing").display()))
        .output()?;
    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8(out.stderr)?.contains("index fetch from"));
    Ok(())
}
