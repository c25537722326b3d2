//! Interactive confirmation prompt.

use std::io::Write;

/// Print `warning` and ask `question (y/N)`. Anything but an exact
/// "y" declines.
pub fn confirm(warning: &str, question: &str) -> std::io::Result<bool> {
    println!("{warning}");
    print!("{question} (y/N): ");
    std::io::stdout().flush()?;

    let mut response = String::new();
    std::io::stdin().read_line(&mut response)?;
    Ok(response.trim() == "y")
}
