//! List command implementation for Nimbus CLI.

use nimbus_core::{Runtime, is_reserved};

use crate::colors;

/// Print every function in the workspace, reserved names dimmed.
pub fn execute(runtime: &Runtime) -> anyhow::Result<()> {
    let count = runtime.functions().load_workspace()?;

    println!(
        "\n{}Functions{} in {}",
        colors::BOLD,
        colors::RESET,
        runtime.config().workspace_path.display()
    );
    println!("{}", "─".repeat(50));

    for name in runtime.functions().names() {
        if is_reserved(&name) {
            println!("  {}{}{}", colors::DIM, name, colors::RESET);
        } else {
            println!("  {name}");
        }
    }

    println!("{}", "─".repeat(50));
    println!("{count} functions");

    Ok(())
}
