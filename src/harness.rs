//! Harness synthesis
//!
//! Builds the exact program text handed to an execution backend: user source
//! wrapped with a driver that invokes the question's target function and
//! prints one canonical result line. Remote/compiled languages are submitted
//! as-is since function-level invocation is infeasible across the service
//! boundary.

use anyhow::Result;
use serde_json::Value;

use crate::languages::HarnessKind;

/// Call metadata for function-call style harnesses
#[derive(Debug, Clone, Default)]
pub struct CallMeta {
    /// Name of the function the driver looks up and invokes
    pub function_name: String,
    /// Ordered, JSON-serializable positional arguments
    pub args: Vec<Value>,
}

/// Produce the executable program text for a language's harness strategy.
pub fn synthesize(kind: HarnessKind, user_source: &str, stdin: &str, meta: &CallMeta) -> Result<String> {
    match kind {
        HarnessKind::FunctionCall => python_driver(user_source, meta),
        HarnessKind::ScriptDriver => Ok(script_driver(user_source, stdin)),
        HarnessKind::PassThrough => Ok(user_source.to_string()),
    }
}

/// Wrap user source with a Python driver that deserializes the injected args,
/// looks up the target function in the global namespace and prints a single
/// formatted line. A missing function prints a diagnostic instead of raising,
/// so it surfaces as an ordinary output mismatch.
fn python_driver(user_source: &str, meta: &CallMeta) -> Result<String> {
    let args_json = serde_json::to_string(&Value::Array(meta.args.clone()))?;
    let args = escape_single_quoted(&args_json);
    let func = escape_single_quoted(&meta.function_name);

    Ok(format!(
        r#"import sys
import json

# User Code Block
{user_source}

# Test Harness
def __run_tests():
    try:
        args = json.loads('{args}')
        if '{func}' in globals():
            func = globals()['{func}']
            res = func(*args)
            if isinstance(res, list):
                print(" ".join(map(str, res)))
            elif isinstance(res, bool):
                print("true" if res else "false")
            else:
                print(str(res))
        else:
            print("Error: Function '{func}' not found.")
    except Exception as e:
        print(f"Harness Error: {{e}}")

__run_tests()
"#
    ))
}

/// Append a trailing driver block that tokenizes the raw stdin text and
/// dispatches to whichever of the known entry points the script defines.
fn script_driver(user_source: &str, stdin: &str) -> String {
    let input = escape_script_string(stdin);

    format!(
        r#"{user_source}

// ---- exam driver ----
fn __drv_int(tok) {{
    let t = tok;
    t.trim();
    parse_int(t)
}}

fn __drv_ints(line) {{
    let out = [];
    for tok in line.split(" ") {{
        let t = tok;
        t.trim();
        if t.len > 0 {{
            out.push(parse_int(t));
        }}
    }}
    out
}}

fn __drv_join(values) {{
    let rendered = "";
    for v in values {{
        if rendered.len > 0 {{
            rendered += " ";
        }}
        rendered += `${{v}}`;
    }}
    rendered
}}

let __drv_input = "{input}";
__drv_input.trim();
let __drv_lines = __drv_input.split("\n");

if is_def_fn("two_sum", 2) {{
    let res = two_sum(__drv_ints(__drv_lines[0]), __drv_int(__drv_lines[1]));
    if type_of(res) == "array" {{
        print(__drv_join(res));
    }} else {{
        print(`${{res}}`);
    }}
}} else if is_def_fn("is_palindrome", 1) {{
    let res = is_palindrome(__drv_int(__drv_lines[0]));
    let rendered = if res == true {{ "true" }} else {{ "false" }};
    print(rendered);
}} else if is_def_fn("factorial", 1) {{
    print(`${{factorial(__drv_int(__drv_lines[0]))}}`);
}} else if is_def_fn("check_odd_even", 1) {{
    print(`${{check_odd_even(__drv_int(__drv_lines[0]))}}`);
}} else {{
    print("Function definition not found or incorrect.");
}}
"#
    )
}

/// Escape a value for substitution inside a single-quoted Python string
/// literal. The serialized args are a single line, so no newline handling is
/// needed beyond JSON's own escaping.
fn escape_single_quoted(text: &str) -> String {
    text.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Escape raw stdin text for substitution inside a double-quoted script
/// string literal.
fn escape_script_string(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
        .replace('\t', "\\t")
}
