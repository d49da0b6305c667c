//! Build script for the demo C project.
//!
//! Compiles every C source under `src/`, links the objects into
//! `$build/app`, and keeps both a stripped and an unstripped copy of the
//! binary. The generated description lands in `build.ninja`.
//!
//! ```text
//! cbuild                   # generate build.ninja (default action)
//! cbuild build             # generate, then run ninja
//! cbuild -D opt_level=3 build
//! cbuild run --run-args "--help"
//! cbuild compdb            # export compile_commands.json
//! ```

use anyhow::Result;

use ninjagen::generator::{BuildEdge, Generator, Rule};
use ninjagen::stage::{CommandStage, Stage, StageError, TypeTag, UnitStage};
use ninjagen::{Action, ActionArg, BuildScript, Invocation, ScriptOption, select, shell};
use ninjagen::vars::VarTable;

fn main() -> Result<()> {
  BuildScript::new("Build script for the demo C project")
    .variable("cc", "gcc")
    .option(
      ScriptOption::new("opt_level", "2")
        .describe("Optimization level passed to the compiler")
        .validate(|value| matches!(value, "0" | "1" | "2" | "3" | "s")),
    )
    .action(Action::new("ninja", generate).describe("Generate build.ninja").default())
    .action(
      Action::new("run", run_app)
        .describe("Build, then run the demo binary")
        .depends_on(["build"])
        .arg(ActionArg::value("args").describe("Arguments forwarded to the binary")),
    )
    .run()?;
  Ok(())
}

/// The generation entry point: seeds the sources, threads them through
/// the stages, and registers the outputs as defaults.
fn generate(invocation: &Invocation<'_>) -> ninjagen::Result<()> {
  Generator::scoped("build.ninja", |ninja| -> ninjagen::Result<()> {
    let compile = CommandStage::new(
      invocation.vars,
      "cc",
      &["$cc", "-O$opt_level", "-Wall", "-MD", "-MF", "$$out.d", "-c", "$$in", "-o", "$$out"],
    )?
    .with("description", "CC $$out")?
    .with("depfile", "$$out.d")?
    .with("out_dir", "$build")?
    .with("out_suffix", ".o")?
    .accept([TypeTag::Ext("c".to_string())]);

    let strip = CommandStage::new(invocation.vars, "strip", &["strip", "-o", "$$out", "$$in"])?
      .with("description", "STRIP $$out")?
      .with("out_suffix", ".stripped")?;
    let keep = UnitStage::new("keep");

    let link = LinkStage::new(invocation.vars)?;

    let sources = select(invocation.vars, "src/*.c")?;
    let objects = sources.apply(ninja, &[&compile])?;
    let binary = objects.merge().apply(ninja, &[&link])?;
    let dist = binary.apply(ninja, &[&strip, &keep])?.fold();
    ninja.add_defaults(dist.collect_files());
    Ok(())
  })
}

/// Runs the linked binary, forwarding `--run-args`.
fn run_app(invocation: &Invocation<'_>) -> ninjagen::Result<()> {
  let binary = invocation.vars.expand_path("$build/app")?;
  let forwarded = invocation.args.get("args").map(String::as_str).unwrap_or("");
  let mut argv = vec![binary.as_str()];
  argv.extend(forwarded.split_whitespace());
  shell::execute(invocation.vars, &argv)?;
  Ok(())
}

/// Links every object in the input group into `$build/app`.
#[derive(Debug, Clone)]
struct LinkStage {
  command: String,
  output: String,
}

impl LinkStage {
  fn new(vars: &VarTable) -> Result<Self, StageError> {
    Ok(Self {
      command: vars.expand("$cc $$in -o $$out")?,
      output: vars.expand_path("$build/app")?,
    })
  }
}

impl Stage for LinkStage {
  fn name(&self) -> &str {
    "link"
  }

  fn input_types(&self) -> Vec<TypeTag> {
    vec![TypeTag::Ext("o".to_string())]
  }

  fn generate_rule(&self, ninja: &mut Generator) -> Result<(), StageError> {
    ninja.add_rule(Rule::new("link", &self.command).with_description("LINK $out"))?;
    Ok(())
  }

  fn generate_build(&self, ninja: &mut Generator, inputs: &[String]) -> Result<String, StageError> {
    if inputs.is_empty() {
      return Err(StageError::InvalidArity {
        stage: "link".to_string(),
        expected: "at least 1",
        actual: 0,
      });
    }
    ninja.add_build(BuildEdge::new("link", &self.output, inputs.to_vec()))?;
    Ok(self.output.clone())
  }

  fn inherit(&self) -> Box<dyn Stage> {
    Box::new(self.clone())
  }
}
