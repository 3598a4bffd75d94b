//! Interactive prompts
//!
//! Plain stdin prompts for template values and variables; sensitive values
//! read through the terminal with echo disabled. `CI=true` suppresses all
//! prompting, turning any prompt into an error.

use std::io::Write;

use console::style;
use miette::{miette, IntoDiagnostic, Result};

use zarf_core::schema::Variable;

use crate::config;

/// Ask for a create-time package template value
pub fn package_template(key: &str) -> Result<String> {
    if config::is_ci() {
        return Err(miette!(
            "template {key} has no value and prompting is disabled in CI"
        ));
    }

    print!(
        "{} Provide a value for {}: ",
        style("?").yellow().bold(),
        style(key).cyan()
    );
    std::io::stdout().flush().into_diagnostic()?;
    read_line()
}

/// Ask for a deploy-time variable value
pub fn variable(variable: &Variable) -> Result<String> {
    if config::is_ci() {
        return Err(miette!(
            "variable {} has no value and prompting is disabled in CI",
            variable.name
        ));
    }

    let label = variable
        .description
        .clone()
        .unwrap_or_else(|| variable.name.clone());

    if variable.sensitive {
        return rpassword::prompt_password(format!("{label}: ")).into_diagnostic();
    }

    print!(
        "{} {} [{}]: ",
        style("?").yellow().bold(),
        style(&label).cyan(),
        variable.default.as_deref().unwrap_or("")
    );
    std::io::stdout().flush().into_diagnostic()?;

    let input = read_line()?;
    if input.is_empty() {
        Ok(variable.default.clone().unwrap_or_default())
    } else {
        Ok(input)
    }
}

/// Yes/no confirmation; `confirm_flag` short-circuits to yes
pub fn confirm(question: &str, confirm_flag: bool) -> bool {
    if confirm_flag {
        return true;
    }
    if config::is_ci() {
        return false;
    }

    print!("{} {question} [y/N]: ", style("?").yellow().bold());
    if std::io::stdout().flush().is_err() {
        return false;
    }

    matches!(read_line().as_deref(), Ok("y") | Ok("Y") | Ok("yes"))
}

fn read_line() -> Result<String> {
    let mut input = String::new();
    std::io::stdin().read_line(&mut input).into_diagnostic()?;
    Ok(input.trim().to_string())
}
