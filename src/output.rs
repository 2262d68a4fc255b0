//! Console rendering for the CLI: status lines, mutation listings and diffs.

use console::Style;
use crate::mutants::{ClassName, MutationDetails};

pub fn print_error(msg: &str) {
    let style = Style::new().red().bold();
    eprintln!("{} {}", style.apply_to("✗"), msg);
}

pub fn print_success(msg: &str) {
    let style = Style::new().green().bold();
    println!("{} {}", style.apply_to("✓"), msg);
}

pub fn print_mutations(class: &ClassName, mutations: &[MutationDetails]) {
    if mutations.is_empty() {
        let dim = Style::new().dim();
        println!("{} {}: no mutations", dim.apply_to("·"), class);
        return;
    }

    let style = Style::new().yellow().bold();
    println!(
        "{} {}: {} mutations",
        style.apply_to("!"),
        class,
        mutations.len(),
    );

    for m in mutations {
        let id_style = Style::new().cyan().bold();
        let loc_style = Style::new().dim();
        let op_style = Style::new().magenta();

        println!(
            "  {} {} {}",
            id_style.apply_to(&m.id),
            loc_style.apply_to(format!("[{}]", m.location())),
            op_style.apply_to(&m.description),
        );
    }
}

pub fn print_mutant_detail(m: &MutationDetails, diff: &str) {
    let id_style = Style::new().cyan().bold();
    let dim = Style::new().dim();

    println!(
        "{} {} [{}]",
        id_style.apply_to(&m.id),
        m.location(),
        m.mutator(),
    );
    println!("  {}", m.description);
    println!(
        "  {}",
        dim.apply_to(format!("{}{} at bytecode offset {}", m.method(), m.id.descriptor, m.instruction)),
    );
    println!();

    for line in diff.lines() {
        if line.starts_with('-') {
            let del_style = Style::new().red();
            println!("  {}", del_style.apply_to(line));
        } else if line.starts_with('+') {
            let add_style = Style::new().green();
            println!("  {}", add_style.apply_to(line));
        }
    }
}
