//! Reader-error scenarios, exercised only through the public
//! `Context::execute` entry point (the reader itself is crate-private; this
//! is exactly what a host sees).

use wisp::Context;

fn error_symbol(src: &str) -> String {
    let mut ctx = Context::new();
    assert!(ctx.execute(src, "<test>").is_none(), "expected a parse error for {src:?}");
    let err = ctx.pending_error().unwrap();
    ctx.symbol_name(err.symbol).unwrap().to_string()
}

#[test]
fn missing_close_paren_is_parenthesis_error() {
    assert_eq!(error_symbol("(1 2 3"), "parse-error-parenthesis");
}

#[test]
fn stray_close_paren_is_unexpected_error() {
    assert_eq!(error_symbol(")"), "parse-error-unexpected");
}

#[test]
fn unterminated_string_is_bad_string() {
    assert_eq!(error_symbol("\"unterminated"), "bad-string");
}

#[test]
fn unknown_character_name_is_bad_character() {
    assert_eq!(error_symbol("#\\notaname"), "bad-character");
}

#[test]
fn dotted_pair_reads_as_improper_list() {
    let mut ctx = Context::new();
    let result = ctx.execute("'(1 2 . 3)", "<test>").expect("dotted pairs are valid syntax");
    let (first, rest) = ctx.pair_parts(result).unwrap();
    assert_eq!(ctx.number_value(first), Some(1.0));
    let (second, tail) = ctx.pair_parts(rest).unwrap();
    assert_eq!(ctx.number_value(second), Some(2.0));
    assert_eq!(ctx.number_value(tail), Some(3.0));
}

#[test]
fn error_parameter_is_source_and_offset() {
    let mut ctx = Context::new();
    assert!(ctx.execute("(1 2", "myfile.wisp").is_none());
    let err = ctx.pending_error().unwrap();
    let (source, offset) = ctx.pair_parts(err.param).expect("reader error param is (source . offset)");
    assert_eq!(ctx.symbol_name(source), Some("myfile.wisp"));
    assert!(ctx.number_value(offset).is_some());
}
