//! The embedding contract itself: registering a native procedure, seeding a
//! global, running a program from a file, and the sticky pending-error
//! lifecycle.

use std::io::Write;

use wisp::{Context, NativeOutcome};

#[test]
fn host_can_register_a_native_procedure() {
    let mut ctx = Context::new();
    ctx.register_procedure("double", |ctx, args| {
        let Some((car, _)) = ctx.pair_parts(args) else {
            return NativeOutcome::NoValue;
        };
        match ctx.number_value(car) {
            Some(n) => NativeOutcome::Value(ctx.make_number(n * 2.0)),
            None => NativeOutcome::NoValue,
        }
    });

    let result = ctx.execute("(double 21)", "<test>").expect("should not fault");
    assert_eq!(ctx.number_value(result), Some(42.0));
}

#[test]
fn host_can_seed_a_global_binding() {
    let mut ctx = Context::new();
    let greeting = ctx.make_string("hello".to_string());
    ctx.define_global("greeting", greeting);
    let result = ctx.execute("greeting", "<test>").expect("should not fault");
    assert_eq!(ctx.string_value(result), Some("hello"));
}

#[test]
fn execute_file_runs_a_program_from_disk() {
    let mut file = tempfile::NamedTempFile::new().expect("create temp file");
    writeln!(file, "(add2 10 32)").expect("write to temp file");

    let mut ctx = Context::new();
    let result = ctx
        .execute_file(file.path())
        .expect("reading the file should succeed")
        .expect("program should not fault");
    assert_eq!(ctx.number_value(result), Some(42.0));
}

#[test]
fn error_is_sticky_until_cleared() {
    let mut ctx = Context::new();
    assert!(!ctx.has_error());
    assert!(ctx.execute("undefined-name", "<test>").is_none());
    assert!(ctx.has_error());

    let err = ctx.pending_error().unwrap();
    assert_eq!(ctx.symbol_name(err.symbol), Some("undefined-identifier"));

    ctx.clear_error();
    assert!(!ctx.has_error());

    // The Context is usable again after clearing.
    let result = ctx.execute("(add2 1 1)", "<test>").expect("should not fault");
    assert_eq!(ctx.number_value(result), Some(2.0));
}

#[test]
fn write_char_appends_to_a_buffer_port() {
    let mut ctx = Context::new();
    let port = ctx.make_buffer_port();
    ctx.define_global("out", port);
    ctx.execute("(write-char out #\\h) (write-char out #\\i)", "<test>").expect("should not fault");
    assert_eq!(ctx.port_buffer_contents(port), Some("hi"));
}

#[test]
fn closed_port_is_inert_but_still_reports_as_a_port() {
    let mut ctx = Context::new();
    let port = ctx.make_buffer_port();
    ctx.close_port(port);
    assert_eq!(ctx.type_name(port), "port");
    assert!(ctx.port_buffer_contents(port).is_none());
}

#[test]
fn user_error_carries_the_raised_symbol_and_parameter() {
    let mut ctx = Context::new();
    assert!(ctx.execute("(error 'my-custom-failure 123)", "<test>").is_none());
    let err = ctx.pending_error().unwrap();
    assert_eq!(ctx.symbol_name(err.symbol), Some("my-custom-failure"));
    assert_eq!(ctx.number_value(err.param), Some(123.0));
}
