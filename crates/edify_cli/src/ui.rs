use colored::*;
use edify_core::SetupStep;

// Status goes to stderr so a generated script can be piped from stdout.

pub fn step(msg: &str) {
    eprintln!("{} {}", ">>".cyan().bold(), msg.bright_white());
}

pub fn ok(msg: &str) {
    eprintln!("{} {}", "✔".green().bold(), msg.green());
}

pub fn warn(msg: &str) {
    eprintln!("{} {}", "⚠️".yellow().bold(), msg.yellow());
}

pub fn err(msg: &str) {
    eprintln!("{} {}", "[!]".red().bold(), msg.red());
}

/// Numbered setup steps, continuation lines of multi-line steps indented.
pub fn format_steps(steps: &[SetupStep]) -> String {
    let mut out = String::new();
    for (idx, step) in steps.iter().enumerate() {
        for (n, line) in step.render().lines().enumerate() {
            if n == 0 {
                out.push_str(&format!("{:>3}. {}\n", idx + 1, line));
            } else {
                out.push_str(&format!("     {}\n", line));
            }
        }
    }
    out
}
