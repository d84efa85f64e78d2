//! Script-generation prompt construction.
//!
//! The prompt separates instructions from user data with explicit XML-style
//! delimiters; everything inside `<test_procedure>` has been validated and
//! sanitised, so an attacker-controlled string cannot escape the user-data
//! section. Building is pure: same inputs, byte-identical output, no LLM
//! call.

use serde_json::Value;

use cartograph_protocol::{TargetFramework, ValidationLimits};
use cartograph_security::{sanitize_description, sanitize_name, sanitize_steps};
use cartograph_security::{ProcedureInput, ValidationError, Validator};

/// The procedure fields the prompt embeds.
#[derive(Debug, Clone, Copy)]
pub struct ScriptSource<'a> {
    pub name: &'a str,
    pub version: i64,
    pub description: &'a str,
    pub steps: &'a [Value],
    pub project_id: &'a str,
    pub created_by: &'a str,
}

const PLAYWRIGHT_REQUIREMENTS: &str = "\
Generate a Playwright test in TypeScript for the procedure above.
- Use @playwright/test with a single test() per procedure.
- Derive locators from the selectors given in the steps; prefer getByRole
  where an accessible role is obvious from the selector.
- Translate assert_text steps into expect(locator).toContainText().
- Translate wait steps into explicit expect polling, never bare timeouts,
  unless the step carries an explicit timeout value.
- Name screenshot files exactly as the step's value field says.
- Emit only the test file content, no commentary.";

const SELENIUM_REQUIREMENTS: &str = "\
Generate a Selenium WebDriver test in Python for the procedure above.
- Use pytest with one test function per procedure and a webdriver fixture.
- Resolve selectors with By.CSS_SELECTOR as given in the steps.
- Translate assert_text steps into WebDriverWait text assertions.
- Honour explicit wait timeouts from the steps; default to 10 seconds.
- Save screenshots under the filename in the step's value field.
- Emit only the test file content, no commentary.";

/// Validate, sanitise, and render the script-generation prompt.
///
/// Validation failure means no prompt is produced and no LLM call happens.
pub fn build_script_prompt(
    source: &ScriptSource<'_>,
    framework: TargetFramework,
    limits: &ValidationLimits,
) -> Result<String, ValidationError> {
    let validator = Validator::new(limits.clone());
    validator.validate_for_script_generation(&ProcedureInput {
        name: source.name,
        description: source.description,
        steps: source.steps,
        project_id: source.project_id,
        created_by: source.created_by,
    })?;

    let name = sanitize_name(source.name);
    let description = sanitize_description(source.description);
    let steps = sanitize_steps(source.steps);
    let steps_json = serde_json::to_string_pretty(&steps)
        .unwrap_or_else(|_| "[]".to_string());

    let requirements = match framework {
        TargetFramework::Playwright => PLAYWRIGHT_REQUIREMENTS,
        TargetFramework::Selenium => SELENIUM_REQUIREMENTS,
    };

    Ok(format!(
        "<test_procedure>\n\
         <name>{name}</name>\n\
         <version>{version}</version>\n\
         <description>{description}</description>\n\
         <test_steps>\n{steps_json}\n</test_steps>\n\
         </test_procedure>\n\
         <requirements>\n{requirements}\n</requirements>\n",
        name = name,
        version = source.version,
        description = description,
        steps_json = steps_json,
        requirements = requirements,
    ))
}
