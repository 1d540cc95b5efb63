mod common;

use panforge::cluster::ClusterTool;
use panforge::config::ToolConfig;
use panforge::PanforgeError;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

fn tool(binary: PathBuf) -> ClusterTool {
    ClusterTool::new(&ToolConfig { binary, threads: 1 })
}

#[test]
fn prior_results_short_circuit_the_invocation() -> anyhow::Result<()> {
    let tmp = TempDir::new()?;
    let genes = tmp.path().join("genes.ffn");
    fs::write(&genes, ">a\nACGT\n")?;

    // Pre-existing artifacts from a prior run; the binary would fail if run.
    fs::write(tmp.path().join("centroids.99.ffn"), ">a\nACGT\n")?;
    fs::write(tmp.path().join("uclust.99.txt"), "S\t0\t4\t*\t*\t*\t*\t*\ta\t*\n")?;

    let tool = tool(PathBuf::from("/nonexistent/clustering-tool"));
    let files = tool.cluster(99, &genes, tmp.path())?;
    assert_eq!(files.centroids, tmp.path().join("centroids.99.ffn"));
    assert_eq!(
        fs::read_to_string(&files.assignments)?,
        "S\t0\t4\t*\t*\t*\t*\t*\ta\t*\n"
    );
    Ok(())
}

#[test]
fn failed_tool_quarantines_partial_output() -> anyhow::Result<()> {
    let tmp = TempDir::new()?;
    let genes = tmp.path().join("genes.ffn");
    fs::write(&genes, ">a\nACGT\n>b\nACGA\n")?;

    let failing = common::write_failing_tool(tmp.path());
    let err = tool(failing).cluster(99, &genes, tmp.path()).unwrap_err();
    assert!(matches!(err, PanforgeError::Tool(_)));
    assert!(err.to_string().contains("simulated clustering failure"));

    // The partial centroid file must not be mistaken for a complete one.
    assert!(!tmp.path().join("centroids.99.ffn").exists());
    assert!(tmp.path().join("centroids.99.ffn.bogus").exists());
    assert!(!tmp.path().join("uclust.99.txt").exists());

    // A subsequent run re-invokes the tool instead of reusing partial files.
    let counter = tmp.path().join("invocations.txt");
    let stub = common::write_stub_tool(tmp.path(), &counter);
    let files = tool(stub).cluster(99, &genes, tmp.path())?;
    assert_eq!(common::invocation_count(&counter), 1);
    assert!(files.centroids.exists());
    assert!(files.assignments.exists());
    Ok(())
}

#[test]
fn missing_binary_is_a_tool_error() {
    let tmp = TempDir::new().unwrap();
    let genes = tmp.path().join("genes.ffn");
    fs::write(&genes, ">a\nACGT\n").unwrap();

    let err = tool(PathBuf::from("/nonexistent/clustering-tool"))
        .cluster(99, &genes, tmp.path())
        .unwrap_err();
    assert!(matches!(err, PanforgeError::Tool(_)));
}
