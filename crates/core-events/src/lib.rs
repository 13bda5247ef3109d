//! Terminal input primitives for the simulator's thin front end.
//!
//! Trimmed down from a speculative async/NGI terminal-input system: the
//! simulator's UI is a blocking read-eval-print loop on a single thread
//! (§5 "the Engine and UI run on a single cooperative main thread"), so
//! there is no event channel, no async task registry, and no tokio
//! dependency here — just the translation from one line of raw input into
//! a `core_engine::Input`.

use core_engine::Input;

/// One line read from the terminal, already trimmed of its trailing
/// newline. Maps 1:1 onto the input commands the Simulation Engine accepts
/// (§4.7): a recognized command keyword, the empty string (skip), or
/// anything else (source code).
pub fn classify(line: &str) -> Input {
    match line.trim_end_matches(['\r', '\n']) {
        "RESET_ALL" => Input::ResetAll,
        "DEV_MESSAGE" => Input::DevMessage,
        "PREV_TASK" => Input::PrevTask,
        "NEXT_TASK" => Input::NextTask,
        "GOTO_FIRST_SKIPPED" => Input::GotoFirstSkipped,
        "SHOW_SOLUTION" => Input::ShowSolution,
        "" => Input::Skip,
        other => Input::Code(other.to_string()),
    }
}

/// Raised when the terminal delivers an interrupt (Ctrl-C). The UI loop
/// checks this between reads and triggers a clean shutdown, including
/// best-effort termination of any in-flight worker (§5 "cancellation and
/// timeouts", category c).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interrupted;

pub fn install_interrupt_handler() -> std::sync::Arc<std::sync::atomic::AtomicBool> {
    let flag = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
    let _ = signal_hook::flag::register(signal_hook::consts::SIGINT, flag.clone());
    flag
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_each_command_keyword() {
        assert!(matches!(classify("RESET_ALL"), Input::ResetAll));
        assert!(matches!(classify("DEV_MESSAGE"), Input::DevMessage));
        assert!(matches!(classify("PREV_TASK"), Input::PrevTask));
        assert!(matches!(classify("NEXT_TASK"), Input::NextTask));
        assert!(matches!(classify("GOTO_FIRST_SKIPPED"), Input::GotoFirstSkipped));
        assert!(matches!(classify("SHOW_SOLUTION"), Input::ShowSolution));
    }

    #[test]
    fn empty_line_means_skip() {
        assert!(matches!(classify(""), Input::Skip));
        assert!(matches!(classify("\n"), Input::Skip));
    }

    #[test]
    fn anything_else_is_source_code() {
        match classify("x = 1 + 2") {
            Input::Code(src) => assert_eq!(src, "x = 1 + 2"),
            other => panic!("expected Code, got {other:?}"),
        }
    }
}
