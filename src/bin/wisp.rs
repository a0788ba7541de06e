//! A thin demonstration binary: loads a file, executes it, and prints the
//! result or error. No argument-parsing framework — just `std::env::args()`.
//! Pretty-printing is not part of the core library, so the small `render`
//! helper below lives only in this bin, built entirely on `Context`'s public
//! inspection accessors.

use std::{env, fs, process::ExitCode};

use wisp::{Context, Value};

fn main() -> ExitCode {
    let args: Vec<String> = env::args().collect();
    let Some(path) = args.get(1) else {
        eprintln!("usage: wisp <file.wisp>");
        return ExitCode::FAILURE;
    };

    let source = match fs::read_to_string(path) {
        Ok(s) => s,
        Err(err) => {
            eprintln!("error reading {path}: {err}");
            return ExitCode::FAILURE;
        }
    };

    let mut ctx = Context::new();
    match ctx.execute(&source, path) {
        Some(result) => {
            println!("{}", render(&ctx, result));
            ExitCode::SUCCESS
        }
        None => {
            let err = ctx.pending_error().expect("execute returned None without a pending error");
            let symbol = ctx.symbol_name(err.symbol).unwrap_or("<non-symbol error>");
            eprintln!("error: {symbol} {}", render(&ctx, err.param));
            ExitCode::FAILURE
        }
    }
}

/// A minimal, debug-only renderer. Not the reader's inverse (no attempt at
/// round-trip-safe quoting of strings), just enough to see what a program
/// produced.
fn render(ctx: &Context, v: Value) -> String {
    if ctx.is_nil(v) {
        return "()".to_string();
    }
    if let Some(b) = ctx.boolean_value(v) {
        return if b { "#t" } else { "#f" }.to_string();
    }
    if let Some(n) = ctx.number_value(v) {
        return render_number(n);
    }
    if let Some(s) = ctx.symbol_name(v) {
        return s.to_string();
    }
    if let Some(s) = ctx.string_value(v) {
        return format!("\"{s}\"");
    }
    if let Some(c) = ctx.char_value(v) {
        return render_char(c);
    }
    if let Some(items) = ctx.vector_items(v) {
        let rendered: Vec<String> = items.iter().map(|&i| render(ctx, i)).collect();
        return format!("#({})", rendered.join(" "));
    }
    if ctx.is_pair(v) {
        return render_pair(ctx, v);
    }
    format!("#<{}>", ctx.type_name(v))
}

fn render_number(n: f64) -> String {
    if n.fract() == 0.0 && n.is_finite() {
        format!("{n:.0}")
    } else {
        n.to_string()
    }
}

fn render_char(code: u32) -> String {
    match char::from_u32(code) {
        Some('\n') => "#\\newline".to_string(),
        Some(' ') => "#\\space".to_string(),
        Some(c) => format!("#\\{c}"),
        None => format!("#\\x{code:x}"),
    }
}

fn render_pair(ctx: &Context, v: Value) -> String {
    let mut parts = Vec::new();
    let mut cursor = v;
    loop {
        match ctx.pair_parts(cursor) {
            Some((car, cdr)) => {
                parts.push(render(ctx, car));
                if ctx.is_nil(cdr) {
                    return format!("({})", parts.join(" "));
                }
                if ctx.is_pair(cdr) {
                    cursor = cdr;
                    continue;
                }
                return format!("({} . {})", parts.join(" "), render(ctx, cdr));
            }
            None => unreachable!("render_pair called on a non-pair"),
        }
    }
}
