use crate::cli::CrashKind;
use crate::crash::CrashCapture;
use anyhow::Context;

/// Run the crash command - returns whether the wrapped call produced a value
pub fn run(capture: &CrashCapture, kind: CrashKind) -> bool {
    match kind {
        CrashKind::Divide => {
            let divide = capture.wrap(divide);
            report(divide((1, std::hint::black_box(0))))
        }
        CrashKind::Unwrap => {
            let parse = capture.wrap(|s: &str| s.parse::<u32>().unwrap());
            report(parse("forty-two"))
        }
        CrashKind::Error => {
            let load = capture.wrap_result(|path: &str| {
                std::fs::read_to_string(path).with_context(|| format!("loading {path}"))
            });
            report(load("/nonexistent/callwrap/config.toml"))
        }
    }
}

#[inline(never)]
fn divide((a, b): (i32, i32)) -> i32 {
    a / b
}

fn report<T: std::fmt::Debug>(result: Option<T>) -> bool {
    match result {
        Some(value) => {
            eprintln!("Result: {:?}", value);
            true
        }
        None => {
            eprintln!("No result: the failure was captured");
            false
        }
    }
}
