//! The S-expression reader.
//!
//! A hand-written recursive-descent scanner over ASCII source bytes. Two
//! implementation choices worth calling out, noted further in `DESIGN.md`:
//!
//! - Closing parens are detected directly, rather than by raising
//!   `parse-error-unexpected` speculatively and swallowing it when the next
//!   character happens to be `)`.
//! - Dotted-pair lists are assembled with a `Vec` of elements plus an
//!   optional tail, rather than an in-place list reversal and pointer-fixup
//!   dance.
//!
//! Branch order matters: an integer literal is attempted first, then
//! quote/quasiquote/unquote forms, then a `#\` character literal (checked
//! before generic symbol scanning because `\` is not itself a symbol
//! character, so nothing later would ever recognize it), then a maximal
//! symbol-character run (from which `#t`/`#f` are recognized after the
//! fact), then a string, then a list, and finally a parse error.

use crate::context::Context;
use crate::error::{CanonicalError, RResult, RuntimeError};
use crate::heap::Value;
use crate::pos::{FilePos, PosTable};

const SYMBOL_EXTRA_CHARS: &[u8] = b"+-*/<>=.!#_?:";

fn is_symbol_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || SYMBOL_EXTRA_CHARS.contains(&b)
}

struct Reader<'a> {
    src: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(src: &'a str) -> Self {
        Self { src: src.as_bytes(), pos: 0 }
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.src.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    fn skip_ws_and_comments(&mut self) {
        loop {
            match self.peek() {
                Some(b) if b.is_ascii_whitespace() => {
                    self.pos += 1;
                }
                Some(b';') => {
                    while !matches!(self.peek(), None | Some(b'\n')) {
                        self.pos += 1;
                    }
                }
                _ => break,
            }
        }
    }

    fn try_parse_integer(&mut self) -> Option<f64> {
        let start = self.pos;
        let mut i = self.pos;
        let neg = match self.src.get(i) {
            Some(b'-') => {
                i += 1;
                true
            }
            Some(b'+') => {
                i += 1;
                false
            }
            _ => false,
        };

        let (radix, digits_start) = if self.src.get(i) == Some(&b'0') && matches!(self.src.get(i + 1), Some(b'x' | b'X')) {
            (16, i + 2)
        } else if self.src.get(i) == Some(&b'0') && matches!(self.src.get(i + 1), Some(b'0'..=b'7')) {
            (8, i + 1)
        } else {
            (10, i)
        };

        let mut j = digits_start;
        while let Some(&c) = self.src.get(j) {
            let valid = match radix {
                16 => c.is_ascii_hexdigit(),
                8 => (b'0'..=b'7').contains(&c),
                _ => c.is_ascii_digit(),
            };
            if !valid {
                break;
            }
            j += 1;
        }
        if j == digits_start {
            self.pos = start;
            return None;
        }
        let text = std::str::from_utf8(&self.src[digits_start..j]).ok()?;
        let magnitude = i64::from_str_radix(text, radix).ok()?;
        let value = if neg { -(magnitude as f64) } else { magnitude as f64 };
        self.pos = j;
        Some(value)
    }

    fn read_symbol_run(&mut self) -> &'a str {
        let start = self.pos;
        while matches!(self.peek(), Some(b) if is_symbol_char(b)) {
            self.pos += 1;
        }
        std::str::from_utf8(&self.src[start..self.pos]).expect("symbol run is ASCII by construction")
    }

    fn read_char_literal(&mut self, ctx: &mut Context) -> RResult<Value> {
        // Caller has already consumed `#\`.
        let rest_start = self.pos;
        while matches!(self.peek(), Some(b) if b.is_ascii_alphanumeric()) {
            self.pos += 1;
        }
        let text = std::str::from_utf8(&self.src[rest_start..self.pos]).unwrap();
        let code = match text {
            "newline" => '\n' as u32,
            "space" => ' ' as u32,
            _ if text.chars().count() == 1 => text.chars().next().unwrap() as u32,
            _ => return Err(RuntimeError::new(CanonicalError::BadCharacter)),
        };
        Ok(ctx.make_char(code))
    }

    fn read_string_literal(&mut self, ctx: &mut Context) -> RResult<Value> {
        // Caller has already consumed the opening quote.
        let start = self.pos;
        loop {
            match self.bump() {
                Some(b'"') => {
                    let text = std::str::from_utf8(&self.src[start..self.pos - 1]).unwrap();
                    return Ok(ctx.make_string(text.to_string()));
                }
                Some(_) => continue,
                None => return Err(RuntimeError::new(CanonicalError::BadString)),
            }
        }
    }

    fn read_list(&mut self, ctx: &mut Context, pos_table: &mut PosTable, source: Value) -> RResult<Value> {
        // Caller has already consumed `(`.
        let mut items: Vec<(Value, usize)> = Vec::new();
        let mut tail = ctx.nil();
        loop {
            self.skip_ws_and_comments();
            match self.peek() {
                None => return Err(RuntimeError::new(CanonicalError::ParseErrorParenthesis)),
                Some(b')') => {
                    self.pos += 1;
                    break;
                }
                _ => {}
            }
            let item_start = self.pos;
            let item = self
                .read_one(ctx, pos_table, source)?
                .ok_or(RuntimeError::new(CanonicalError::ParseErrorParenthesis))?;

            if !items.is_empty() && ctx.is_dot_symbol(item) {
                self.skip_ws_and_comments();
                tail = self
                    .read_one(ctx, pos_table, source)?
                    .ok_or(RuntimeError::new(CanonicalError::ParseErrorParenthesis))?;
                self.skip_ws_and_comments();
                if self.peek() != Some(b')') {
                    return Err(RuntimeError::new(CanonicalError::ParseErrorParenthesis));
                }
                self.pos += 1;
                break;
            }
            items.push((item, item_start));
        }

        let mut list = tail;
        for (item, offset) in items.into_iter().rev() {
            list = ctx.make_pair(item, list);
            pos_table.record(list, FilePos { source, offset });
        }
        Ok(list)
    }

    fn read_quote_form(&mut self, ctx: &mut Context, pos_table: &mut PosTable, source: Value, head: &str) -> RResult<Value> {
        let inner = self
            .read_one(ctx, pos_table, source)?
            .ok_or(RuntimeError::new(CanonicalError::ParseErrorUnexpected))?;
        let head_sym = ctx.sym(head);
        Ok(ctx.make_pair(head_sym, ctx.make_pair(inner, ctx.nil())))
    }

    /// Reads exactly one datum, returning `Ok(None)` at end of input with
    /// no error (distinguishing "nothing left to read" from a parse
    /// failure).
    fn read_one(&mut self, ctx: &mut Context, pos_table: &mut PosTable, source: Value) -> RResult<Option<Value>> {
        self.skip_ws_and_comments();
        let Some(b) = self.peek() else {
            return Ok(None);
        };

        if let Some(n) = self.try_parse_integer() {
            return Ok(Some(ctx.make_number(n)));
        }

        if b == b'\'' {
            self.pos += 1;
            return self.read_quote_form(ctx, pos_table, source, "quote").map(Some);
        }
        if b == b'`' {
            self.pos += 1;
            return self.read_quote_form(ctx, pos_table, source, "quasiquote").map(Some);
        }
        if b == b',' {
            self.pos += 1;
            if self.peek() == Some(b'@') {
                self.pos += 1;
                return self.read_quote_form(ctx, pos_table, source, "unquote-splicing").map(Some);
            }
            return self.read_quote_form(ctx, pos_table, source, "unquote").map(Some);
        }

        if b == b'#' && self.peek_at(1) == Some(b'\\') {
            self.pos += 2;
            return self.read_char_literal(ctx).map(Some);
        }

        if is_symbol_char(b) {
            let text = self.read_symbol_run();
            return Ok(Some(match text {
                "#t" => ctx.true_value(),
                "#f" => ctx.false_value(),
                _ => ctx.sym(text),
            }));
        }

        if b == b'"' {
            self.pos += 1;
            return self.read_string_literal(ctx).map(Some);
        }

        if b == b'(' {
            self.pos += 1;
            return self.read_list(ctx, pos_table, source).map(Some);
        }

        Err(RuntimeError::new(CanonicalError::ParseErrorUnexpected))
    }
}

/// Reads every top-level form in `src`, returning them as a proper list in
/// source order. `source` should be a symbol naming the input (a file path,
/// or an ad-hoc name for programmatically-supplied text); it is threaded
/// into every recorded `FilePos` and, on error, becomes half of the
/// composite `(source . byte-offset)` error parameter.
pub(crate) fn read_all(ctx: &mut Context, src: &str, source: Value, pos_table: &mut PosTable) -> RResult<Value> {
    let mut reader = Reader::new(src);
    let mut forms = Vec::new();
    loop {
        match reader.read_one(ctx, pos_table, source) {
            Ok(Some(v)) => forms.push(v),
            Ok(None) => break,
            Err(err) => {
                let offset = ctx.make_number(reader.pos as f64);
                let param = ctx.make_pair(source, offset);
                return Err(RuntimeError::with_param(err.kind, param));
            }
        }
    }
    let mut list = ctx.nil();
    for form in forms.into_iter().rev() {
        list = ctx.make_pair(form, list);
    }
    Ok(list)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::HeapData;

    fn list_items(ctx: &Context, mut list: Value) -> Vec<Value> {
        let mut out = Vec::new();
        loop {
            match ctx.heap_ref().get(list) {
                HeapData::Pair(car, cdr) => {
                    out.push(*car);
                    list = *cdr;
                }
                _ => break,
            }
        }
        out
    }

    #[test]
    fn reads_atoms_and_nested_lists() {
        let mut ctx = Context::new();
        let mut pos = PosTable::new();
        let source = ctx.sym("<test>");
        let forms = read_all(&mut ctx, "(1 2 (3 . 4) #t \"hi\" #\\a sym)", source, &mut pos).unwrap();
        let items = list_items(&ctx, forms);
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn unterminated_list_is_parenthesis_error() {
        let mut ctx = Context::new();
        let mut pos = PosTable::new();
        let source = ctx.sym("<test>");
        let err = read_all(&mut ctx, "(1 2", source, &mut pos).unwrap_err();
        assert_eq!(err.kind, CanonicalError::ParseErrorParenthesis);
    }

    #[test]
    fn unterminated_string_is_bad_string() {
        let mut ctx = Context::new();
        let mut pos = PosTable::new();
        let source = ctx.sym("<test>");
        let err = read_all(&mut ctx, "\"abc", source, &mut pos).unwrap_err();
        assert_eq!(err.kind, CanonicalError::BadString);
    }

    #[test]
    fn case_insensitive_symbols_share_identity() {
        let mut ctx = Context::new();
        let a = ctx.sym("IF");
        let b = ctx.sym("if");
        assert_eq!(a, b);
    }
}
