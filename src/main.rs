//! Gridmind CLI - solve tasks from JSON records.

use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use gridmind::{
    compute::Solver,
    schema::{EngineConfig, Grid, Task, TestCase, TrainingPair},
};

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: {} <task.json> [config.json]", args[0]);
        eprintln!();
        eprintln!("Infer the transformation rule behind a task's training pairs");
        eprintln!("and apply it to the task's test inputs.");
        eprintln!();
        eprintln!("Arguments:");
        eprintln!("  task.json    Path to a task record");
        eprintln!("  config.json  Optional engine configuration (defaults otherwise)");
        eprintln!();
        eprintln!("Example task and config are generated with --example.");
        std::process::exit(1);
    }

    if args[1] == "--example" {
        print_example();
        return;
    }

    let task_path = PathBuf::from(&args[1]);
    let task_str = fs::read_to_string(&task_path).unwrap_or_else(|e| {
        eprintln!("Error reading task file: {}", e);
        std::process::exit(1);
    });
    let task: Task = serde_json::from_str(&task_str).unwrap_or_else(|e| {
        eprintln!("Error parsing task: {}", e);
        std::process::exit(1);
    });

    let config: EngineConfig = match args.get(2) {
        Some(path) => {
            let config_str = fs::read_to_string(path).unwrap_or_else(|e| {
                eprintln!("Error reading config file: {}", e);
                std::process::exit(1);
            });
            serde_json::from_str(&config_str).unwrap_or_else(|e| {
                eprintln!("Error parsing config: {}", e);
                std::process::exit(1);
            })
        }
        None => EngineConfig::default(),
    };

    let solver = Solver::new(config).unwrap_or_else(|e| {
        eprintln!("Invalid configuration: {}", e);
        std::process::exit(1);
    });

    println!("Gridmind");
    println!("========");
    println!("Task: {}", task.task_id);
    println!("Training pairs: {}", task.train.len());
    println!("Test inputs: {}", task.test.len());
    println!();

    let start = Instant::now();
    let solutions = solver.solve(&task);
    let elapsed = start.elapsed();

    for (i, solution) in solutions.iter().enumerate() {
        println!(
            "Test {}: method={} confidence={:.3} validation={}/{} (error rate {:.3})",
            i,
            solution.method,
            solution.confidence,
            solution.validation.matched,
            solution.validation.total,
            solution.validation.error_rate
        );
        if !solution.diagnostics.detector_failures.is_empty() {
            println!(
                "  detector failures: {}",
                solution.diagnostics.detector_failures.join("; ")
            );
        }
    }
    println!();
    println!("Time: {:.2}ms", elapsed.as_secs_f64() * 1000.0);
    println!();
    println!("{}", serde_json::to_string_pretty(&solutions).unwrap());
}

fn print_example() {
    let task = Task {
        task_id: "rotation-example".to_string(),
        train: vec![TrainingPair {
            input: Grid::from_rows(vec![vec![1, 2], vec![3, 4]]).unwrap(),
            output: Grid::from_rows(vec![vec![3, 1], vec![4, 2]]).unwrap(),
        }],
        test: vec![TestCase {
            input: Grid::from_rows(vec![vec![5, 6], vec![7, 8]]).unwrap(),
            output: None,
        }],
    };

    println!("Example task (task.json):");
    println!("{}", serde_json::to_string_pretty(&task).unwrap());
    println!();
    println!("Example configuration (config.json):");
    println!(
        "{}",
        serde_json::to_string_pretty(&EngineConfig::default()).unwrap()
    );
}
