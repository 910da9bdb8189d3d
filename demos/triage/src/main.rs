//! Triage Demo
//!
//! Demonstrates pathwise-flow with a small consultation.
//! A main flow asks about fever, calls a sub-flow for the respiratory
//! findings, and takes a checkpoint once the findings are recorded.
//!
//! Run with `RUST_LOG=pathwise_flow=debug` to see the propagation.

use pathwise_core::{Condition, Formula, Rating, Value};
use pathwise_flow::{Action, FlowConfig, FlowSet, FlowSetBuilder, Session};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

const CONFIG: &str = "(suggest_mode: Suggest, max_rounds: 200)";

fn build_knowledge_base() -> pathwise_flow::Result<FlowSet> {
    let mut b = FlowSetBuilder::new();

    // main: start -> ask fever -> (fever = high) -> respiratory -> recorded -> done
    let main = b.create_flow("main")?;
    b.set_autostart(main, true)?;
    let start = b.create_start_node(main, "start")?;
    let ask = b.create_action_node(main, "ask fever", Action::indicate(["fever form"]))?;
    let flu = b.create_action_node(main, "suspect flu", Action::rate("flu", Rating::Suggested))?;
    let resp = b.create_composed_node(main, "respiratory", "respiratory", "start")?;
    let recorded = b.create_snapshot_node(main, "recorded")?;
    let score = b.create_action_node(
        main,
        "score",
        Action::formula(
            "severity",
            Formula::Add(
                Box::new(Formula::fact("temperature")),
                Box::new(Formula::Lit(-37.0)),
            ),
        ),
    )?;
    let done = b.create_end_node(main, "done")?;
    b.create_edge(start, ask, Condition::True)?;
    b.create_edge(ask, flu, Condition::choice("fever", "high"))?;
    b.create_edge(flu, resp, Condition::True)?;
    b.create_edge(resp, recorded, Condition::exit_reached("respiratory", "finished"))?;
    b.create_edge(recorded, score, Condition::known("temperature"))?;
    b.create_edge(score, done, Condition::True)?;

    // respiratory: start -> (cough = yes) -> bronchitis -> finished
    //              start -> (cough = no) -> finished
    let sub = b.create_flow("respiratory")?;
    let sub_start = b.create_start_node(sub, "start")?;
    let bronchitis = b.create_action_node(
        sub,
        "bronchitis",
        Action::rate("bronchitis", Rating::Established),
    )?;
    let finished = b.create_end_node(sub, "finished")?;
    b.create_comment_node(sub, "no cough: nothing to rate")?;
    b.create_edge(sub_start, bronchitis, Condition::choice("cough", "yes"))?;
    b.create_edge(bronchitis, finished, Condition::True)?;
    b.create_edge(sub_start, finished, Condition::choice("cough", "no"))?;

    b.build()
}

fn report(session: &Session, step: &str) {
    println!("-- {}", step);
    for run in session.runs() {
        let active: Vec<&str> = run
            .active_nodes()
            .map(|node| session.kb().node(node).name())
            .collect();
        println!("   {}: {}", run.id(), active.join(", "));
    }
    for fact in ["flu", "bronchitis", "severity"] {
        if let Some(value) = session.value(&fact.into()) {
            println!("   {} = {}", fact, value);
        }
    }
    if !session.suspected_solutions().is_empty() {
        let suspected: Vec<&str> = session
            .suspected_solutions()
            .iter()
            .map(|fact| fact.as_str())
            .collect();
        println!("   suspected: {}", suspected.join(", "));
    }
    println!();
}

fn main() -> pathwise_flow::Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("tracing subscriber already installed");
    }

    println!("=== Pathwise Triage Demo ===\n");

    let kb = Arc::new(build_knowledge_base()?);
    let config = FlowConfig::from_ron_str(CONFIG)?;
    info!(flows = kb.flows().count(), nodes = kb.nodes().count(), "knowledge base built");

    let mut session = Session::new(Arc::clone(&kb), config)?;
    report(&session, "session started");

    let solutions = ["flu".into(), "bronchitis".into()];
    let questions = session.discriminating_questions(&solutions);
    let names: Vec<&str> = questions.iter().map(|q| q.as_str()).collect();
    println!("Questions worth asking: {}\n", names.join(", "));

    session.set_value("fever", Value::choice("high"))?;
    report(&session, "fever = high");

    session.set_value("cough", Value::choice("yes"))?;
    report(&session, "cough = yes (checkpoint taken)");

    session.set_value("temperature", 39.5)?;
    report(&session, "temperature = 39.5");

    // frozen by the checkpoint: withdrawing the answer keeps the rating
    session.retract_value("cough")?;
    report(&session, "cough retracted");

    let sources = session.active_derivation_sources(&"severity".into());
    println!("severity derived from: {:?}", sources);
    println!("time of no return: {}", session.time_of_no_return());

    Ok(())
}
