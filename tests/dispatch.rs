// tests/dispatch.rs
//
// Dispatcher behavior against real child processes: failure isolation, output
// attribution through the directory diff, and identity filtering when workers
// share one output directory.

use anyhow::Result;
use chunkflow::template::{ChunkIdentity, CommandTemplate};
use chunkflow::{Dispatcher, Entry, JsonTableStore, Table, TableStore};
use std::path::PathBuf;
use tempfile::tempdir;

fn write_chunks(dir: &std::path::Path, n: usize) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for i in 1..=n {
        let t = Table::new(
            vec!["obs".into()],
            vec![format!("s{i}")],
            vec![Entry { observation: 0, sample: 0, value: i as f64 }],
        )?;
        let path = dir.join(format!("split_{i}.table"));
        JsonTableStore.save(&t, &path, "chunk")?;
        paths.push(path);
    }
    Ok(paths)
}

#[test]
fn failed_commands_are_recorded_not_propagated() -> Result<()> {
    let dir = tempdir()?;
    let chunks = write_chunks(dir.path(), 2)?;

    // cp without a destination exits non-zero.
    let template = CommandTemplate::parse("cp {input}")?;
    let dispatcher = Dispatcher::new(&template, dir.path(), dir.path(), "table", 1);

    let invocations = dispatcher.dispatch(&chunks)?;
    assert_eq!(invocations.len(), 2);
    for inv in &invocations {
        assert!(!inv.succeeded);
        assert!(inv.output_files.is_empty());
    }
    Ok(())
}

#[test]
fn unlaunchable_command_is_a_chunk_failure() -> Result<()> {
    let dir = tempdir()?;
    let chunks = write_chunks(dir.path(), 1)?;

    let template = CommandTemplate::parse("definitely-not-a-real-binary {input}")?;
    let dispatcher = Dispatcher::new(&template, dir.path(), dir.path(), "table", 1);

    let invocations = dispatcher.dispatch(&chunks)?;
    assert!(!invocations[0].succeeded);
    Ok(())
}

#[test]
fn sequential_dispatch_attributes_new_files_per_chunk() -> Result<()> {
    let dir = tempdir()?;
    let chunks = write_chunks(dir.path(), 3)?;

    let template = CommandTemplate::parse("cp {input} {input}.out")?;
    let dispatcher = Dispatcher::new(&template, dir.path(), dir.path(), "table", 1);

    let invocations = dispatcher.dispatch(&chunks)?;
    for (i, inv) in invocations.iter().enumerate() {
        assert_eq!(inv.chunk_index, i);
        assert!(inv.succeeded);
        assert_eq!(inv.output_files.len(), 1, "chunk {i}");
        let name = inv.output_files[0].file_name().unwrap().to_string_lossy().into_owned();
        assert_eq!(name, format!("split_{}.table.out", i + 1));
    }
    Ok(())
}

#[test]
fn concurrent_dispatch_filters_by_chunk_identity() -> Result<()> {
    let dir = tempdir()?;
    let chunks = write_chunks(dir.path(), 4)?;

    // Every chunk also drops an unmarked file into the shared directory; the
    // identity filter must keep it out of all attributions.
    let template =
        CommandTemplate::parse("sh -c 'cp {input} {input}.out; : > {input}_noise'")?;
    let dispatcher = Dispatcher::new(&template, dir.path(), dir.path(), "table", 4);

    let invocations = dispatcher.dispatch(&chunks)?;
    assert_eq!(invocations.len(), 4);
    for (i, inv) in invocations.iter().enumerate() {
        assert!(inv.succeeded, "chunk {i}");
        assert_eq!(inv.output_files.len(), 1, "chunk {i}: {:?}", inv.output_files);
        let name = inv.output_files[0].file_name().unwrap().to_string_lossy().into_owned();
        assert!(ChunkIdentity(i).matches(&name), "chunk {i} got {name}");
        assert!(!name.ends_with("_noise"));
    }
    Ok(())
}

#[test]
fn unmarkable_template_keeps_every_output_under_many_workers() -> Result<()> {
    let dir = tempdir()?;
    let chunks = write_chunks(dir.path(), 3)?;

    // `_copy` after the placeholder matches neither rewriting rule, so no
    // output name can carry a marker; dispatch must not filter the diffs
    // down to nothing.
    let template = CommandTemplate::parse("cp {input} {input}_copy.table")?;
    let dispatcher = Dispatcher::new(&template, dir.path(), dir.path(), "table", 4);

    let invocations = dispatcher.dispatch(&chunks)?;
    assert_eq!(invocations.len(), 3);
    for (i, inv) in invocations.iter().enumerate() {
        assert!(inv.succeeded, "chunk {i}");
        assert_eq!(inv.output_files.len(), 1, "chunk {i}: {:?}", inv.output_files);
        let name = inv.output_files[0].file_name().unwrap().to_string_lossy().into_owned();
        assert_eq!(name, format!("split_{}.table_copy.table", i + 1));
    }
    Ok(())
}

#[test]
fn output_directory_separate_from_workdir() -> Result<()> {
    let dir = tempdir()?;
    let chunks = write_chunks(dir.path(), 1)?;
    let out = dir.path().join("out");
    std::fs::create_dir(&out)?;

    let template = CommandTemplate::parse(&format!(
        "cp {{input}} {}/result.table",
        out.display()
    ))?;
    let dispatcher = Dispatcher::new(&template, &out, dir.path(), "table", 1);

    let invocations = dispatcher.dispatch(&chunks)?;
    assert!(invocations[0].succeeded);
    assert_eq!(invocations[0].output_files, vec![out.join("result.table")]);
    // The chunk file itself is not attributed; only the output dir is diffed.
    let loaded = JsonTableStore.load(&invocations[0].output_files[0])?;
    assert_eq!(loaded.sample_ids(), &["s1".to_string()]);
    Ok(())
}
