//! Test that all Rhai code blocks in scripting.md compile and run.
//!
//! Run with: cargo test --test scripting_docs

use std::fs;
use std::time::Duration;

use algoland::block_registry::HeightAssignment;
use algoland::config::PlaygroundConfig;
use algoland::input::HeadlessCapture;
use algoland::physics::SimpleWorld;
use algoland::playground::Playground;
use algoland::scheduler::RunStatus;
use algoland::scripting::{compile, ScriptLimits};

/// Extract all Rhai code blocks from markdown content
fn extract_rhai_blocks(content: &str) -> Vec<(usize, String)> {
    let mut blocks = Vec::new();
    let mut in_rhai_block = false;
    let mut current_block = String::new();
    let mut block_start_line = 0;

    for (line_num, line) in content.lines().enumerate() {
        if line.trim().starts_with("```rhai") {
            in_rhai_block = true;
            block_start_line = line_num + 1;
            current_block.clear();
        } else if in_rhai_block && line.trim() == "```" {
            in_rhai_block = false;
            blocks.push((block_start_line, current_block.clone()));
        } else if in_rhai_block {
            current_block.push_str(line);
            current_block.push('\n');
        }
    }

    blocks
}

fn docs() -> Vec<(usize, String)> {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/docs/scripting.md");
    let content = fs::read_to_string(path).expect("Failed to read docs/scripting.md");
    extract_rhai_blocks(&content)
}

#[test]
fn test_all_rhai_blocks_compile() {
    let blocks = docs();
    assert!(!blocks.is_empty(), "No rhai blocks found in docs");

    let limits = ScriptLimits::default();
    let mut failures = Vec::new();
    for (line, code) in &blocks {
        if let Err(diag) = compile(code, &limits) {
            failures.push(format!("line {}: {}", line, diag));
        }
    }

    assert!(failures.is_empty(), "Doc blocks failed to compile:\n{}", failures.join("\n"));
}

#[test]
fn test_all_rhai_blocks_run_to_completion() {
    let mut failures = Vec::new();

    for (line, code) in docs() {
        let config = PlaygroundConfig::default();
        let world = SimpleWorld::new(config.gravity).with_ground_size(config.ground_size);
        let mut pg = Playground::new(
            config,
            world,
            Box::new(HeadlessCapture),
            HeightAssignment::Shuffled {
                heights: vec![5.0, 3.0, 4.0, 1.0, 2.0],
                seed: 11,
            },
        )
        .unwrap();

        pg.run_source(&code);
        for _ in 0..5_000 {
            if pg.script_status() != RunStatus::Running {
                break;
            }
            pg.tick(Duration::from_millis(16));
        }

        if pg.script_status() != RunStatus::Completed {
            failures.push(format!(
                "line {}: {:?} {}",
                line,
                pg.script_status(),
                pg.last_script_error().unwrap_or("")
            ));
        }
    }

    assert!(failures.is_empty(), "Doc blocks failed to run:\n{}", failures.join("\n"));
}

#[test]
fn test_sort_examples_sort_the_row() {
    for (line, code) in docs() {
        if !code.contains("swapped") && !code.contains("let min") {
            continue;
        }

        let config = PlaygroundConfig::default();
        let world = SimpleWorld::new(config.gravity).with_ground_size(config.ground_size);
        let mut pg = Playground::new(
            config,
            world,
            Box::new(HeadlessCapture),
            HeightAssignment::InOrder(vec![4.0, 2.0, 5.0, 1.0, 3.0]),
        )
        .unwrap();

        pg.run_source(&code);
        for _ in 0..5_000 {
            if pg.script_status() != RunStatus::Running {
                break;
            }
            pg.tick(Duration::from_millis(16));
        }
        assert_eq!(pg.script_status(), RunStatus::Completed, "example at line {}", line);
        assert_eq!(pg.heights(), vec![1.0, 2.0, 3.0, 4.0, 5.0], "example at line {}", line);
    }
}
