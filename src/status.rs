//! Colored status lines for the step log
//!
//! All termcolor operations use `let _ =`: colored output is decorative, and
//! a closed or redirected stream must not fail the step.

/// Print a green success line to stdout
#[macro_export]
macro_rules! success {
    ($($arg:tt)*) => {{
        use std::io::Write as _;
        use termcolor::WriteColor as _;
        let bufwtr = termcolor::BufferWriter::stdout(termcolor::ColorChoice::Auto);
        let mut buffer = bufwtr.buffer();
        let _ = buffer.set_color(termcolor::ColorSpec::new().set_fg(Some(termcolor::Color::Green)));
        let _ = write!(&mut buffer, "✓ ");
        let _ = buffer.reset();
        let _ = writeln!(&mut buffer, $($arg)*);
        let _ = bufwtr.print(&buffer);
    }};
}

/// Print a red failure line to stderr
#[macro_export]
macro_rules! failure {
    ($($arg:tt)*) => {{
        use std::io::Write as _;
        use termcolor::WriteColor as _;
        let bufwtr = termcolor::BufferWriter::stderr(termcolor::ColorChoice::Auto);
        let mut buffer = bufwtr.buffer();
        let _ = buffer.set_color(termcolor::ColorSpec::new().set_fg(Some(termcolor::Color::Red)));
        let _ = write!(&mut buffer, "❌ ");
        let _ = buffer.reset();
        let _ = writeln!(&mut buffer, $($arg)*);
        let _ = bufwtr.print(&buffer);
    }};
}

/// Echo a command line about to run, `$ ...` in bold
#[macro_export]
macro_rules! echo {
    ($($arg:tt)*) => {{
        use std::io::Write as _;
        use termcolor::WriteColor as _;
        let bufwtr = termcolor::BufferWriter::stdout(termcolor::ColorChoice::Auto);
        let mut buffer = bufwtr.buffer();
        let _ = writeln!(&mut buffer);
        let _ = buffer.set_color(termcolor::ColorSpec::new().set_bold(true).set_fg(Some(termcolor::Color::Green)));
        let _ = write!(&mut buffer, "$ ");
        let _ = writeln!(&mut buffer, $($arg)*);
        let _ = buffer.reset();
        let _ = bufwtr.print(&buffer);
    }};
}
