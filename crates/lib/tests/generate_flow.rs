//! End-to-end generation: selection, stages, fan-out, and the artifact.

use std::fs;

use ninjagen::generator::Generator;
use ninjagen::stage::{CommandStage, TypeTag, UnitStage};
use ninjagen::{FileGroup, VarTable, select};
use tempfile::TempDir;

fn touch(temp: &TempDir, name: &str) {
  fs::write(temp.path().join(name), "").unwrap();
}

/// The canonical scenario: select `./*.py` matching exactly `build.py`,
/// run it through a `.out`-suffixing transform, then fan out through
/// `[transform, unit]` and fold.
#[test]
fn worked_scenario_from_selection_to_fold() {
  let temp = TempDir::new().unwrap();
  touch(&temp, "build.py");

  let vars = VarTable::new();
  let mut ninja = Generator::new(temp.path().join("build.ninja"));

  let transform = CommandStage::new(&vars, "t", &["copy", "$$in", "$$out"]).unwrap();
  let unit = UnitStage::default();

  let pattern = format!("{}/*.py", temp.path().display());
  let seeded = select(&vars, &pattern).unwrap();
  assert_eq!(seeded.group_count(), 1);

  let first = seeded.apply(&mut ninja, &[&transform]).unwrap();
  let prefix = temp.path().display().to_string().replace('\\', "/");
  assert_eq!(first.collect_files(), [format!("{prefix}/build.py.out")]);

  let second = first.apply(&mut ninja, &[&transform, &unit]).unwrap().fold();
  assert_eq!(
    second.collect_files(),
    [format!("{prefix}/build.py.out.out"), format!("{prefix}/build.py.out")]
  );

  // Two build edges: the first transform plus the branched transform;
  // the unit stage never touches the generator.
  assert_eq!(ninja.builds().len(), 2);
  assert_eq!(ninja.rules().len(), 1);
}

#[test]
fn compile_and_link_flow_produces_complete_description() {
  let temp = TempDir::new().unwrap();
  touch(&temp, "main.c");
  touch(&temp, "util.c");

  let mut vars = VarTable::new();
  vars.set("src", temp.path().display().to_string());
  vars.set("build", format!("{}/target/build", temp.path().display()));

  let artifact = temp.path().join("build.ninja");
  Generator::scoped(&artifact, |ninja| -> ninjagen::Result<()> {
    let compile = CommandStage::new(&vars, "cc", &["gcc", "-c", "$$in", "-o", "$$out"])?
      .with("out_dir", "$build")?
      .with("out_suffix", ".o")?
      .with("description", "CC $$out")?
      .accept([TypeTag::Ext("c".to_string())]);
    let link = CommandStage::new(&vars, "link", &["gcc", "$$in", "-o", "$$out"])?
      .with("out_suffix", ".elf")?
      .accept([TypeTag::Ext("o".to_string())]);

    let sources = select(&vars, "$src/*.c")?;
    let objects = sources.apply(ninja, &[&compile])?;
    let binary = objects.merge().apply(ninja, &[&link])?;
    ninja.add_defaults(binary.collect_files());
    Ok(())
  })
  .unwrap();

  let text = fs::read_to_string(&artifact).unwrap();
  assert!(text.contains("rule cc\n"));
  assert!(text.contains("    command = gcc -c $in -o $out\n"));
  assert!(text.contains("    description = CC $out\n"));
  assert!(text.contains("rule link\n"));
  // One build line per source, then one link over both objects.
  assert_eq!(text.matches(": cc ").count(), 2);
  assert_eq!(text.matches(": link ").count(), 1);
  assert!(text.contains("# 3 build statement(s) generated\n"));
  assert!(text.contains("default "));
  assert!(text.trim_end().ends_with(".elf"));
}

#[test]
fn failed_scope_leaves_no_artifact_behind() {
  let temp = TempDir::new().unwrap();
  let artifact = temp.path().join("build.ninja");

  let result = Generator::scoped(&artifact, |ninja| -> ninjagen::Result<()> {
    let vars = VarTable::new();
    let transform = CommandStage::new(&vars, "t", &["copy", "$$in", "$$out"])?;
    // Narrowed to `py`, so the `.out` results cannot flow into it.
    let narrowed = CommandStage::new(&vars, "narrow", &["x"])?.accept([TypeTag::Ext("py".to_string())]);
    let seeded = FileGroup::from_paths(["a.py"]);
    let transformed = seeded.apply(ninja, &[&transform])?;
    transformed.apply(ninja, &[&narrowed])?;
    Ok(())
  });

  assert!(result.is_err());
  assert!(!artifact.exists());
}

#[test]
fn empty_selection_generates_an_empty_description() {
  let temp = TempDir::new().unwrap();
  let artifact = temp.path().join("build.ninja");

  let vars = VarTable::new();
  let pattern = format!("{}/*.c", temp.path().display());

  Generator::scoped(&artifact, |ninja| -> ninjagen::Result<()> {
    let compile = CommandStage::new(&vars, "cc", &["gcc", "-c", "$$in", "-o", "$$out"])?;
    let sources = select(&vars, &pattern)?;
    let objects = sources.apply(ninja, &[&compile])?;
    ninja.add_defaults(objects.collect_files());
    Ok(())
  })
  .unwrap();

  let text = fs::read_to_string(&artifact).unwrap();
  assert!(text.contains("# 0 build statement(s) generated\n"));
  assert!(!text.contains("default "));
}
