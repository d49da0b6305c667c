//! Action dispatch through the command-line surface.

use std::cell::RefCell;
use std::rc::Rc;

use ninjagen::{Action, ActionArg, BuildScript, Error, ScriptOption};

type Log = Rc<RefCell<Vec<String>>>;

fn recording(log: &Log, name: &str) -> Action {
  let log = log.clone();
  let tag = name.to_string();
  Action::new(name, move |_| {
    log.borrow_mut().push(tag.clone());
    Ok(())
  })
}

#[test]
fn default_action_runs_when_none_requested() {
  let log: Log = Rc::default();
  let script = BuildScript::new("test script").action(recording(&log, "ninja").default());

  script.run_from(["script"]).unwrap();

  assert_eq!(*log.borrow(), ["ninja"]);
}

#[test]
fn requested_action_runs_with_dependencies_first() {
  let log: Log = Rc::default();
  let script = BuildScript::new("test script")
    .action(recording(&log, "ninja").default())
    .action(recording(&log, "package").depends_on(["ninja"]));

  script.run_from(["script", "package"]).unwrap();

  assert_eq!(*log.borrow(), ["ninja", "package"]);
}

#[test]
fn independent_action_runs_alone() {
  let log: Log = Rc::default();
  let script = BuildScript::new("test script")
    .action(recording(&log, "ninja").default())
    .action(recording(&log, "lint"));

  script.run_from(["script", "lint"]).unwrap();

  assert_eq!(*log.borrow(), ["lint"]);
}

#[test]
fn unknown_action_is_rejected() {
  let log: Log = Rc::default();
  let script = BuildScript::new("test script").action(recording(&log, "ninja").default());

  let err = script.run_from(["script", "missing"]).unwrap_err();
  assert!(err.to_string().contains("unknown action `missing`"));
  assert!(log.borrow().is_empty());
}

#[test]
fn cycle_is_rejected_before_any_action_body_runs() {
  let log: Log = Rc::default();
  let script = BuildScript::new("test script")
    .action(recording(&log, "ninja").default())
    .action(recording(&log, "a").depends_on(["b"]))
    .action(recording(&log, "b").depends_on(["a"]));

  let err = script.run_from(["script", "a"]).unwrap_err();
  assert!(err.to_string().contains("dependency cycle"));
  assert!(log.borrow().is_empty());
}

#[test]
fn missing_generator_action_is_rejected() {
  let log: Log = Rc::default();
  let script = BuildScript::new("test script").action(recording(&log, "lint"));

  let err = script.run_from(["script", "lint"]).unwrap_err();
  assert!(matches!(err, Error::Script(_)));
  assert!(err.to_string().contains("no `ninja` action"));
}

#[test]
fn duplicate_user_action_is_rejected() {
  let log: Log = Rc::default();
  let script = BuildScript::new("test script")
    .action(recording(&log, "ninja").default())
    .action(recording(&log, "build"));

  let err = script.run_from(["script"]).unwrap_err();
  assert!(err.to_string().contains("already registered"));
}

#[test]
fn options_reach_the_action_body() {
  let seen: Log = Rc::default();
  let sink = seen.clone();
  let script = BuildScript::new("test script")
    .option(ScriptOption::new("opt_level", "2"))
    .action(
      Action::new("ninja", move |invocation| {
        sink.borrow_mut().push(format!(
          "opt_level={} release={}",
          invocation.options["opt_level"], invocation.options["release"]
        ));
        Ok(())
      })
      .default(),
    );

  script.run_from(["script", "-D", "opt_level=3", "-r"]).unwrap();

  assert_eq!(*seen.borrow(), ["opt_level=3 release=1"]);
}

#[test]
fn bare_assignment_sets_option_to_one() {
  let seen: Log = Rc::default();
  let sink = seen.clone();
  let script = BuildScript::new("test script")
    .option(ScriptOption::new("verbose_codegen", "0"))
    .action(
      Action::new("ninja", move |invocation| {
        sink.borrow_mut().push(invocation.options["verbose_codegen"].clone());
        Ok(())
      })
      .default(),
    );

  script.run_from(["script", "-D", "verbose_codegen"]).unwrap();

  assert_eq!(*seen.borrow(), ["1"]);
}

#[test]
fn undeclared_option_is_rejected() {
  let log: Log = Rc::default();
  let script = BuildScript::new("test script").action(recording(&log, "ninja").default());

  let err = script.run_from(["script", "-D", "ghost=1"]).unwrap_err();
  assert!(err.to_string().contains("not declared"));
  assert!(log.borrow().is_empty());
}

#[test]
fn validator_rejects_bad_values() {
  let log: Log = Rc::default();
  let script = BuildScript::new("test script")
    .option(ScriptOption::new("opt_level", "2").validate(|value| matches!(value, "0" | "1" | "2" | "3")))
    .action(recording(&log, "ninja").default());

  let err = script.run_from(["script", "-D", "opt_level=11"]).unwrap_err();
  assert!(err.to_string().contains("not valid for option `opt_level`"));
  assert!(log.borrow().is_empty());
}

#[test]
fn action_arguments_are_forwarded() {
  let seen: Log = Rc::default();
  let sink = seen.clone();
  let script = BuildScript::new("test script")
    .action(
      Action::new("ninja", |_| Ok(())).default(),
    )
    .action(
      Action::new("package", move |invocation| {
        sink.borrow_mut().push(format!(
          "verify={} files={}",
          invocation.args["verify"], invocation.args["files"]
        ));
        Ok(())
      })
      .arg(ActionArg::flag("verify"))
      .arg(ActionArg::list("files")),
    );

  script
    .run_from(["script", "package", "--package-verify", "--package-files", "a.tar", "b.tar"])
    .unwrap();

  assert_eq!(*seen.borrow(), ["verify=1 files=a.tar b.tar"]);
}

#[test]
fn unset_action_arguments_read_as_defaults() {
  let seen: Log = Rc::default();
  let sink = seen.clone();
  let script = BuildScript::new("test script").action(
    Action::new("ninja", move |invocation| {
      sink.borrow_mut().push(format!(
        "flag={} value={}",
        invocation.args["rebuild"], invocation.args["profile"]
      ));
      Ok(())
    })
    .arg(ActionArg::flag("rebuild"))
    .arg(ActionArg::value("profile"))
    .default(),
  );

  script.run_from(["script"]).unwrap();

  assert_eq!(*seen.borrow(), ["flag=0 value="]);
}

#[test]
fn user_variables_are_available_to_actions() {
  let seen: Log = Rc::default();
  let sink = seen.clone();
  let script = BuildScript::new("test script")
    .variable("cc", "gcc")
    .action(
      Action::new("ninja", move |invocation| {
        sink.borrow_mut().push(invocation.vars.expand("$cc -c")?);
        Ok(())
      })
      .default(),
    );

  script.run_from(["script"]).unwrap();

  assert_eq!(*seen.borrow(), ["gcc -c"]);
}

#[test]
fn option_hash_reflects_option_values() {
  let seen: Log = Rc::default();
  let sink = seen.clone();
  let make = |sink: Log| {
    BuildScript::new("test script")
      .option(ScriptOption::new("opt_level", "2"))
      .action(
        Action::new("ninja", move |invocation| {
          sink
            .borrow_mut()
            .push(invocation.vars.get("option_hash").unwrap_or_default().to_string());
          Ok(())
        })
        .default(),
      )
  };

  make(sink.clone()).run_from(["script"]).unwrap();
  make(sink.clone()).run_from(["script"]).unwrap();
  make(sink).run_from(["script", "-D", "opt_level=0"]).unwrap();

  let hashes = seen.borrow();
  assert_eq!(hashes[0], hashes[1]);
  assert_ne!(hashes[0], hashes[2]);
  assert_eq!(hashes[0].len(), 8);
}

#[test]
fn variable_clashing_with_builtin_is_rejected() {
  let log: Log = Rc::default();
  let script = BuildScript::new("test script")
    .variable("root", "elsewhere")
    .action(recording(&log, "ninja").default());

  let err = script.run_from(["script"]).unwrap_err();
  assert!(err.to_string().contains("already defined"));
}

#[test]
fn list_flag_short_circuits_dispatch() {
  let log: Log = Rc::default();
  let script = BuildScript::new("test script").action(recording(&log, "ninja").default());

  script.run_from(["script", "-l"]).unwrap();

  assert!(log.borrow().is_empty());
}
