extern crate clap;

use clap::Parser;

mod circuit;
mod detectors;
mod error;
mod experiment;
mod noise;
mod plan;
mod qubits;
mod surface;
mod surgery;

use noise::ErrorModel;
use plan::ExperimentPlan;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// The filename of the experiment plan (JSON) to be compiled.
    #[arg(short, long)]
    plan_filename: String,

    /// Where to write the stim circuit. Written to stdout when omitted.
    #[arg(short, long)]
    circuit_output_filename: Option<String>,

    #[arg(short, long)]
    summary_output_filename: Option<String>,

    #[arg(long, default_value_t = 0.0)]
    single_qubit_error: f64,

    #[arg(long, default_value_t = 0.0)]
    two_qubit_error: f64,

    #[arg(long, default_value_t = 0.0)]
    measurement_error: f64,
}

#[derive(serde::Serialize)]
struct RunSummary {
    distance: u32,
    num_patches: usize,
    num_qubits: usize,
    num_instructions: usize,
    num_measurements: usize,
    num_detectors: usize,
    num_observables: usize,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    for (name, rate) in [
        ("single-qubit-error", args.single_qubit_error),
        ("two-qubit-error", args.two_qubit_error),
        ("measurement-error", args.measurement_error),
    ] {
        if !(0.0..=1.0).contains(&rate) {
            eprintln!("Error: {} must be a probability, but got {}", name, rate);
            return;
        }
    }

    let source = match std::fs::read_to_string(&args.plan_filename) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("Error: failed to read {}: {}", args.plan_filename, e);
            return;
        }
    };
    let plan = match ExperimentPlan::new_from_json(&source) {
        Ok(plan) => plan,
        Err(e) => {
            eprintln!("Error: {}", e);
            return;
        }
    };
    println!("distance = {}", plan.distance);
    println!("num patches = {}", plan.patches.len());
    println!("num steps = {}", plan.steps.len());

    let error_model = if args.single_qubit_error == 0.0
        && args.two_qubit_error == 0.0
        && args.measurement_error == 0.0
    {
        ErrorModel::None
    } else {
        ErrorModel::Uniform {
            single_qubit: args.single_qubit_error,
            two_qubit: args.two_qubit_error,
            measurement: args.measurement_error,
        }
    };

    let experiment = match plan.execute(error_model) {
        Ok(experiment) => experiment,
        Err(e) => {
            eprintln!("Error: {}", e);
            return;
        }
    };
    println!("num qubits = {}", experiment.num_qubits());
    println!("num measurements = {}", experiment.measurements().len());
    println!("num detectors = {}", experiment.circuit().num_detectors());
    println!("num observables = {}", experiment.observable_count());

    let circuit_text = experiment.circuit().to_string();
    match &args.circuit_output_filename {
        Some(filename) => {
            std::fs::write(filename, circuit_text).unwrap();
            println!("Wrote the circuit to {}", filename);
        }
        None => print!("{}", circuit_text),
    }

    if let Some(filename) = args.summary_output_filename {
        let summary = RunSummary {
            distance: plan.distance,
            num_patches: experiment.num_patches(),
            num_qubits: experiment.num_qubits(),
            num_instructions: experiment.circuit().instructions().len(),
            num_measurements: experiment.circuit().num_measurements(),
            num_detectors: experiment.circuit().num_detectors(),
            num_observables: experiment.circuit().num_observables(),
        };
        let serialized = serde_json::to_string(&summary).unwrap();
        std::fs::write(filename.clone(), serialized).unwrap();
        println!("Wrote the summary to {}", filename);
    }
}
