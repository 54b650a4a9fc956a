// tests/pipeline.rs
//
// End-to-end runs over the real filesystem with real child processes. The
// external command is `cp` (or a small `sh` script), which makes the wrapped
// tool an identity transform so the split/merge round trip is checkable.

use anyhow::Result;
use chunkflow::*;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

/// A table where each sample has a private observation plus one shared with a
/// neighbor, so partitioning has some structure to work with.
fn demo_table(samples: usize) -> Table {
    let observation_ids: Vec<String> = (0..samples + 2).map(|i| format!("obs{i}")).collect();
    let sample_ids: Vec<String> = (0..samples).map(|i| format!("sample{i}")).collect();
    let mut entries = Vec::new();
    for s in 0..samples {
        entries.push(Entry { observation: s, sample: s, value: (s + 1) as f64 });
        entries.push(Entry { observation: s + 2, sample: s, value: 1.0 });
    }
    Table::new(observation_ids, sample_ids, entries).unwrap()
}

fn save_input(table: &Table, dir: &Path) -> Result<PathBuf> {
    let path = dir.join("demo.table");
    JsonTableStore.save(table, &path, "test input")?;
    Ok(path)
}

fn sample_set(table: &Table) -> BTreeSet<String> {
    table.sample_ids().iter().cloned().collect()
}

#[test]
fn split_copy_join_round_trip() -> Result<()> {
    let dir = tempdir()?;
    let original = demo_table(6);
    let input = save_input(&original, dir.path())?;
    let final_dir = dir.path().join("final");

    let mut config = RunConfig::new(
        &input,
        "cp {input} {input}_out.table",
        vec![r".*_out\.table$".into()],
    );
    config.max_chunk_size = 2;
    config.output_group_names = Some(vec!["out".into()]);
    config.output_prefix = Some("demo".into());
    config.final_output_dir = final_dir.clone();

    let summary = Orchestrator::new(config).run()?;
    assert_eq!(summary.chunks, 3);
    assert_eq!(summary.failed_chunks, 0);
    assert_eq!(summary.outputs, vec![final_dir.join("demo_out.table")]);

    let merged = JsonTableStore.load(&final_dir.join("demo_out.table"))?;
    assert_eq!(sample_set(&merged), sample_set(&original));
    // Values survive the round trip sample by sample.
    for id in original.sample_ids() {
        assert_eq!(merged.sample_values(id), original.sample_values(id), "sample {id}");
    }
    Ok(())
}

#[test]
fn pass_through_identity_for_any_chunk_size() -> Result<()> {
    let dir = tempdir()?;
    let original = demo_table(5);
    let input = save_input(&original, dir.path())?;

    for max_chunk_size in [1, 3, 100] {
        let final_dir = dir.path().join(format!("final_{max_chunk_size}"));
        let mut config = RunConfig::new(
            &input,
            "cp {input} {input}_out.table",
            vec![r"_out\.table$".into()],
        );
        config.max_chunk_size = max_chunk_size;
        config.output_group_names = Some(vec!["out".into()]);
        config.final_output_dir = final_dir.clone();

        Orchestrator::new(config).run()?;
        let merged = JsonTableStore.load(&final_dir.join("demo_out.table"))?;
        assert_eq!(sample_set(&merged), sample_set(&original), "max={max_chunk_size}");
        assert_eq!(
            merged.observation_ids().iter().collect::<BTreeSet<_>>(),
            original.observation_ids().iter().collect::<BTreeSet<_>>(),
            "max={max_chunk_size}"
        );
    }
    Ok(())
}

#[test]
fn concurrent_run_matches_sequential_run() -> Result<()> {
    let dir = tempdir()?;
    let original = demo_table(8);
    let input = save_input(&original, dir.path())?;

    let mut results = Vec::new();
    for workers in [1usize, 3] {
        let final_dir = dir.path().join(format!("final_w{workers}"));
        let mut config =
            RunConfig::new(&input, "cp {input} {input}.out", vec![r"\.out$".into()]);
        config.max_chunk_size = 2;
        config.num_workers = workers;
        config.output_group_names = Some(vec!["processed".into()]);
        config.final_output_dir = final_dir.clone();

        let summary = Orchestrator::new(config).run()?;
        assert_eq!(summary.failed_chunks, 0, "workers={workers}");
        results.push(JsonTableStore.load(&final_dir.join("demo_processed.table"))?);
    }

    let (seq, par) = (&results[0], &results[1]);
    assert_eq!(seq.shape(), par.shape());
    assert_eq!(sample_set(seq), sample_set(par));
    assert_eq!(
        seq.observation_ids().iter().collect::<BTreeSet<_>>(),
        par.observation_ids().iter().collect::<BTreeSet<_>>()
    );
    Ok(())
}

#[test]
fn concurrent_run_with_unmarkable_output_names_still_completes() -> Result<()> {
    let dir = tempdir()?;
    let original = demo_table(6);
    let input = save_input(&original, dir.path())?;
    let final_dir = dir.path().join("final");

    // The derived output name uses `_`, so no token can carry a chunk
    // marker; the run must still deliver every sample rather than filtering
    // all outputs away.
    let mut config = RunConfig::new(
        &input,
        "cp {input} {input}_out.table",
        vec![r"_out\.table$".into()],
    );
    config.max_chunk_size = 2;
    config.num_workers = 3;
    config.output_group_names = Some(vec!["out".into()]);
    config.output_prefix = Some("demo".into());
    config.final_output_dir = final_dir.clone();

    let summary = Orchestrator::new(config).run()?;
    assert_eq!(summary.chunks, 3);
    assert_eq!(summary.failed_chunks, 0);
    assert_eq!(summary.outputs, vec![final_dir.join("demo_out.table")]);

    let merged = JsonTableStore.load(&final_dir.join("demo_out.table"))?;
    assert_eq!(sample_set(&merged), sample_set(&original));
    Ok(())
}

#[test]
fn group_name_count_mismatch_is_fatal_before_any_work() -> Result<()> {
    let dir = tempdir()?;
    let input = save_input(&demo_table(4), dir.path())?;
    let final_dir = dir.path().join("never_created");

    let mut config =
        RunConfig::new(&input, "cp {input} {input}.out", vec![r"\.out$".into()]);
    config.output_group_names = Some(vec!["a".into(), "b".into()]);
    config.final_output_dir = final_dir.clone();

    let err = Orchestrator::new(config).run().unwrap_err();
    assert!(err.to_string().contains("must match"), "got: {err}");
    // Validation fires before any directory is touched.
    assert!(!final_dir.exists());
    Ok(())
}

#[test]
fn missing_input_is_fatal() {
    let config = RunConfig::new("/no/such/input.table", "cp {input} x", vec![".".into()]);
    let err = Orchestrator::new(config).run().unwrap_err();
    assert!(err.to_string().contains("not found"), "got: {err}");
}

#[test]
fn empty_pattern_list_is_fatal() -> Result<()> {
    let dir = tempdir()?;
    let input = save_input(&demo_table(2), dir.path())?;
    let config = RunConfig::new(&input, "cp {input} {input}.out", vec![]);
    assert!(Orchestrator::new(config).run().is_err());
    Ok(())
}

#[test]
fn failing_chunk_does_not_abort_the_run() -> Result<()> {
    let dir = tempdir()?;
    let original = demo_table(6);
    let input = save_input(&original, dir.path())?;
    let final_dir = dir.path().join("final");

    // Fail for the second split only; copy everything else through.
    let script =
        "sh -c 'case {input} in *split_2.table) exit 3 ;; esac; cp {input} {input}_out.table'";
    let mut config = RunConfig::new(&input, script, vec![r"_out\.table$".into()]);
    config.max_chunk_size = 2;
    config.output_group_names = Some(vec!["out".into()]);
    config.final_output_dir = final_dir.clone();

    let summary = Orchestrator::new(config).run()?;
    assert_eq!(summary.chunks, 3);
    assert_eq!(summary.failed_chunks, 1);

    // The successful chunks' samples still reach the merged output.
    let merged = JsonTableStore.load(&final_dir.join("demo_out.table"))?;
    assert_eq!(merged.num_samples(), 4);
    assert!(sample_set(&merged).is_subset(&sample_set(&original)));
    Ok(())
}

#[test]
fn unmatched_category_produces_no_artifact() -> Result<()> {
    let dir = tempdir()?;
    let input = save_input(&demo_table(4), dir.path())?;
    let final_dir = dir.path().join("final");

    let mut config = RunConfig::new(
        &input,
        "cp {input} {input}_out.table",
        vec![r"_out\.table$".into(), "never_matches_anything".into()],
    );
    config.output_group_names = Some(vec!["out".into(), "ghost".into()]);
    config.final_output_dir = final_dir.clone();

    let summary = Orchestrator::new(config).run()?;
    assert_eq!(summary.outputs, vec![final_dir.join("demo_out.table")]);
    assert!(!final_dir.join("demo_ghost.table").exists());
    Ok(())
}

#[test]
fn pass_through_mode_copies_renamed_chunk_outputs() -> Result<()> {
    let dir = tempdir()?;
    let original = demo_table(6);
    let input = save_input(&original, dir.path())?;
    let final_dir = dir.path().join("final");

    let mut config = RunConfig::new(
        &input,
        "cp {input} {input}_out.table",
        vec![r"_out\.table$".into()],
    );
    config.max_chunk_size = 2;
    config.output_group_names = Some(vec!["out".into()]);
    config.final_output_dir = final_dir.clone();
    config.no_join = true;

    let summary = Orchestrator::new(config).run()?;
    assert_eq!(summary.outputs.len(), 3);

    // Copies are prefixed and individually loadable; together they cover the
    // whole sample set.
    let mut seen = BTreeSet::new();
    for path in &summary.outputs {
        let name = path.file_name().unwrap().to_string_lossy();
        assert!(name.starts_with("demo_out_split_"), "got: {name}");
        let chunk = JsonTableStore.load(path)?;
        seen.extend(chunk.sample_ids().iter().cloned());
    }
    assert_eq!(seen, sample_set(&original));
    Ok(())
}

#[test]
fn default_group_names_and_prefix_apply() -> Result<()> {
    let dir = tempdir()?;
    let input = save_input(&demo_table(3), dir.path())?;
    let final_dir = dir.path().join("final");

    let mut config = RunConfig::new(
        &input,
        "cp {input} {input}_out.table",
        vec![r"_out\.table$".into()],
    );
    config.final_output_dir = final_dir.clone();

    let summary = Orchestrator::new(config).run()?;
    // Prefix defaults to the input stem, group name to its index.
    assert_eq!(summary.outputs, vec![final_dir.join("demo_group_0.table")]);
    Ok(())
}
