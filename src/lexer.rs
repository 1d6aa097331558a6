//! Byte-stream tokenizer for the supported C89 subset.
//!
//! Produces the longest valid token at each step. Invalid input never
//! aborts lexing: an unrecognized character or an unterminated literal
//! yields an `Unknown` token plus a diagnostic, and scanning resumes at the
//! next reasonable position — see spec §4.1 / §7.

use crate::diagnostics::{Diagnostics, SourceLocation};
use std::path::PathBuf;
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Keywords
    KwAuto,
    KwBreak,
    KwCase,
    KwChar,
    KwConst,
    KwContinue,
    KwDefault,
    KwDo,
    KwDouble,
    KwElse,
    KwEnum,
    KwExtern,
    KwFloat,
    KwFor,
    KwGoto,
    KwIf,
    KwInt,
    KwLong,
    KwRegister,
    KwReturn,
    KwShort,
    KwSigned,
    KwSizeof,
    KwStatic,
    KwStruct,
    KwSwitch,
    KwTypedef,
    KwUnion,
    KwUnsigned,
    KwVoid,
    KwVolatile,
    KwWhile,

    Identifier,
    IntLiteral,
    FloatLiteral,
    StringLiteral,
    CharLiteral,

    // Operators
    Assign,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Inc,
    Dec,
    Shl,
    Shr,
    AndAnd,
    OrOr,
    Not,
    Amp,
    Pipe,
    Caret,
    Tilde,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    PercentAssign,
    AmpAssign,
    PipeAssign,
    CaretAssign,
    ShlAssign,
    ShrAssign,
    Question,

    // Delimiters
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Semicolon,
    Comma,
    Colon,
    Dot,
    Arrow,

    Hash,
    HashHash,

    Eof,
    Unknown,
}

/// An immutable lexical token. `lexeme` borrows the source text owned by
/// the `Lexer`'s caller via a shared `Rc<str>` so tokens never outlive the
/// source they reference.
#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: Rc<str>,
    /// Escape-processed value for char/string literals; `None` otherwise.
    pub processed: Option<String>,
    pub location: SourceLocation,
}

impl Token {
    pub fn text(&self) -> &str {
        self.processed.as_deref().unwrap_or(&self.lexeme)
    }
}

const MAX_LEXER_ERRORS: usize = 100;

fn keyword(word: &str) -> Option<TokenKind> {
    use TokenKind::*;
    Some(match word {
        "auto" => KwAuto,
        "break" => KwBreak,
        "case" => KwCase,
        "char" => KwChar,
        "const" => KwConst,
        "continue" => KwContinue,
        "default" => KwDefault,
        "do" => KwDo,
        "double" => KwDouble,
        "else" => KwElse,
        "enum" => KwEnum,
        "extern" => KwExtern,
        "float" => KwFloat,
        "for" => KwFor,
        "goto" => KwGoto,
        "if" => KwIf,
        "int" => KwInt,
        "long" => KwLong,
        "register" => KwRegister,
        "return" => KwReturn,
        "short" => KwShort,
        "signed" => KwSigned,
        "sizeof" => KwSizeof,
        "static" => KwStatic,
        "struct" => KwStruct,
        "switch" => KwSwitch,
        "typedef" => KwTypedef,
        "union" => KwUnion,
        "unsigned" => KwUnsigned,
        "void" => KwVoid,
        "volatile" => KwVolatile,
        "while" => KwWhile,
        _ => return None,
    })
}

/// Consumes a source buffer left-to-right, producing tokens on demand.
pub struct Lexer {
    bytes: Vec<u8>,
    pos: usize,
    line: usize,
    column: usize,
    filename: PathBuf,
    errors_emitted: usize,
}

impl Lexer {
    pub fn new(source: &str, filename: impl Into<PathBuf>) -> Self {
        Lexer {
            bytes: source.as_bytes().to_vec(),
            pos: 0,
            line: 1,
            column: 1,
            filename: filename.into(),
            errors_emitted: 0,
        }
    }

    fn peek(&self) -> u8 {
        self.peek_at(0)
    }

    fn peek_at(&self, n: usize) -> u8 {
        *self.bytes.get(self.pos + n).unwrap_or(&0)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn advance(&mut self) -> u8 {
        let c = self.bytes[self.pos];
        self.pos += 1;
        if c == b'\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        c
    }

    fn here(&self) -> SourceLocation {
        SourceLocation::new(self.filename.clone(), self.line, self.column)
    }

    fn make(&self, kind: TokenKind, start: SourceLocation, lexeme: &str) -> Token {
        Token {
            kind,
            lexeme: Rc::from(lexeme),
            processed: None,
            location: start,
        }
    }

    /// Lexes the entire source into a token vector ending in exactly one
    /// `Eof` token, reporting errors into `diags`.
    pub fn lex_all(mut self, diags: &mut Diagnostics) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            let tok = self.next_token(diags);
            let is_eof = tok.kind == TokenKind::Eof;
            tokens.push(tok);
            if is_eof {
                break;
            }
        }
        tokens
    }

    fn skip_whitespace_and_comments(&mut self, diags: &mut Diagnostics) {
        loop {
            match self.peek() {
                b' ' | b'\t' | b'\r' | b'\n' => {
                    self.advance();
                }
                b'/' if self.peek_at(1) == b'/' => {
                    while !self.at_end() && self.peek() != b'\n' {
                        self.advance();
                    }
                }
                b'/' if self.peek_at(1) == b'*' => {
                    let start = self.here();
                    self.advance();
                    self.advance();
                    let mut closed = false;
                    while !self.at_end() {
                        if self.peek() == b'*' && self.peek_at(1) == b'/' {
                            self.advance();
                            self.advance();
                            closed = true;
                            break;
                        }
                        self.advance();
                    }
                    if !closed {
                        self.report(diags, "unterminated block comment", start);
                    }
                }
                b'#' if self.looks_like_line_directive() => {
                    self.handle_line_directive(diags);
                }
                _ => break,
            }
        }
    }

    fn looks_like_line_directive(&self) -> bool {
        let mut i = 1;
        while matches!(self.peek_at(i), b' ' | b'\t') {
            i += 1;
        }
        self.bytes[self.pos + i..].starts_with(b"line")
    }

    /// `# line <N> ["filename"]` — resets the line counter and, if a
    /// string follows, the current filename.
    fn handle_line_directive(&mut self, diags: &mut Diagnostics) {
        let start = self.here();
        self.advance(); // '#'
        while matches!(self.peek(), b' ' | b'\t') {
            self.advance();
        }
        for _ in 0..4 {
            self.advance(); // "line"
        }
        while matches!(self.peek(), b' ' | b'\t') {
            self.advance();
        }
        let digits_start = self.pos;
        while self.peek().is_ascii_digit() {
            self.advance();
        }
        if self.pos == digits_start {
            self.report(diags, "malformed #line directive: expected line number", start);
            self.skip_rest_of_line();
            return;
        }
        let n: usize = std::str::from_utf8(&self.bytes[digits_start..self.pos])
            .unwrap()
            .parse()
            .unwrap_or(1);
        while matches!(self.peek(), b' ' | b'\t') {
            self.advance();
        }
        if self.peek() == b'"' {
            let str_start = self.here();
            self.advance();
            let mut name = String::new();
            while !self.at_end() && self.peek() != b'"' && self.peek() != b'\n' {
                name.push(self.advance() as char);
            }
            if self.peek() != b'"' {
                self.report(diags, "malformed #line directive: unterminated filename", str_start);
                self.skip_rest_of_line();
                return;
            }
            self.advance();
            self.filename = PathBuf::from(name);
        }
        // skip_rest_of_line consumes the directive's trailing newline, which
        // bumps self.line by one — pre-bias it here so that bump lands on N.
        self.line = n.saturating_sub(1);
        self.skip_rest_of_line();
    }

    fn skip_rest_of_line(&mut self) {
        while !self.at_end() && self.peek() != b'\n' {
            self.advance();
        }
        if !self.at_end() {
            self.advance();
        }
    }

    fn report(&mut self, diags: &mut Diagnostics, message: &str, location: SourceLocation) {
        self.errors_emitted += 1;
        if self.errors_emitted <= MAX_LEXER_ERRORS {
            diags.error(message.to_string(), location);
        }
    }

    fn next_token(&mut self, diags: &mut Diagnostics) -> Token {
        self.skip_whitespace_and_comments(diags);
        let start = self.here();

        if self.at_end() {
            return self.make(TokenKind::Eof, start, "");
        }

        let c = self.peek();
        if c.is_ascii_alphabetic() || c == b'_' {
            return self.scan_identifier_or_keyword(start);
        }
        if c.is_ascii_digit() || (c == b'.' && self.peek_at(1).is_ascii_digit()) {
            return self.scan_number(diags, start);
        }
        match c {
            b'\'' => self.scan_char_literal(diags, start),
            b'"' => self.scan_string_literal(diags, start),
            b'(' | b')' | b'{' | b'}' | b'[' | b']' | b';' | b',' | b'.' => {
                self.scan_delimiter(start)
            }
            b'#' => self.scan_hash(start),
            _ => self.scan_operator(diags, start),
        }
    }

    fn scan_identifier_or_keyword(&mut self, start: SourceLocation) -> Token {
        let begin = self.pos;
        while self.peek().is_ascii_alphanumeric() || self.peek() == b'_' {
            self.advance();
        }
        let text = std::str::from_utf8(&self.bytes[begin..self.pos]).unwrap();
        let kind = keyword(text).unwrap_or(TokenKind::Identifier);
        self.make(kind, start, text)
    }

    fn scan_number(&mut self, diags: &mut Diagnostics, start: SourceLocation) -> Token {
        let begin = self.pos;
        let mut is_float = false;

        if self.peek() == b'0' && matches!(self.peek_at(1), b'x' | b'X') {
            self.advance();
            self.advance();
            let hex_start = self.pos;
            while self.peek().is_ascii_hexdigit() {
                self.advance();
            }
            if self.pos == hex_start {
                self.report(diags, "invalid hex literal: no digits after 0x", start);
            }
            self.consume_int_suffix();
            let text = std::str::from_utf8(&self.bytes[begin..self.pos]).unwrap();
            return self.make(TokenKind::IntLiteral, start, text);
        }

        if self.peek() == b'0' && self.peek_at(1).is_ascii_digit() {
            self.advance();
            let oct_start = self.pos;
            while self.peek().is_ascii_digit() {
                if self.peek() == b'8' || self.peek() == b'9' {
                    self.report(
                        diags,
                        &format!("invalid digit '{}' in octal literal", self.peek() as char),
                        start.clone(),
                    );
                }
                self.advance();
            }
            let _ = oct_start;
            self.consume_int_suffix();
            let text = std::str::from_utf8(&self.bytes[begin..self.pos]).unwrap();
            return self.make(TokenKind::IntLiteral, start, text);
        }

        while self.peek().is_ascii_digit() {
            self.advance();
        }
        if self.peek() == b'.' {
            is_float = true;
            self.advance();
            while self.peek().is_ascii_digit() {
                self.advance();
            }
        }
        if matches!(self.peek(), b'e' | b'E') {
            let save = self.pos;
            let mut cursor = self.pos + 1;
            if matches!(self.bytes.get(cursor), Some(b'+') | Some(b'-')) {
                cursor += 1;
            }
            if self.bytes.get(cursor).is_some_and(u8::is_ascii_digit) {
                is_float = true;
                while self.pos < cursor {
                    self.advance();
                }
                while self.peek().is_ascii_digit() {
                    self.advance();
                }
            } else {
                let _ = save;
            }
        }

        if is_float {
            if matches!(self.peek(), b'f' | b'F' | b'l' | b'L') {
                self.advance();
            }
            let text = std::str::from_utf8(&self.bytes[begin..self.pos]).unwrap();
            self.make(TokenKind::FloatLiteral, start, text)
        } else {
            self.consume_int_suffix();
            let text = std::str::from_utf8(&self.bytes[begin..self.pos]).unwrap();
            self.make(TokenKind::IntLiteral, start, text)
        }
    }

    /// Any combination of u/U and l/L/ll/LL, in either order, at most once
    /// per family.
    fn consume_int_suffix(&mut self) {
        let mut seen_u = false;
        let mut seen_l = 0;
        loop {
            match self.peek() {
                b'u' | b'U' if !seen_u => {
                    seen_u = true;
                    self.advance();
                }
                b'l' | b'L' if seen_l < 2 => {
                    seen_l += 1;
                    self.advance();
                }
                _ => break,
            }
        }
    }

    fn scan_char_literal(&mut self, diags: &mut Diagnostics, start: SourceLocation) -> Token {
        let begin = self.pos;
        self.advance(); // opening '
        let mut value = String::new();
        let mut ok = true;
        if self.peek() == b'\\' {
            self.advance();
            match self.peek() {
                b'n' => {
                    value.push('\n');
                    self.advance();
                }
                b't' => {
                    value.push('\t');
                    self.advance();
                }
                b'r' => {
                    value.push('\r');
                    self.advance();
                }
                b'\\' => {
                    value.push('\\');
                    self.advance();
                }
                b'\'' => {
                    value.push('\'');
                    self.advance();
                }
                b'0' => {
                    value.push('\0');
                    self.advance();
                }
                other => {
                    self.report(
                        diags,
                        &format!("invalid escape sequence '\\{}' in character literal", other as char),
                        start.clone(),
                    );
                    ok = false;
                    if other != b'\'' && !self.at_end() {
                        self.advance();
                    }
                }
            }
        } else if self.peek() == b'\'' || self.at_end() || self.peek() == b'\n' {
            self.report(diags, "empty or unterminated character literal", start.clone());
            ok = false;
        } else {
            value.push(self.advance() as char);
        }

        if self.peek() == b'\'' {
            self.advance();
        } else {
            self.report(diags, "unterminated character literal", start.clone());
            ok = false;
        }

        let lexeme = std::str::from_utf8(&self.bytes[begin..self.pos]).unwrap();
        if !ok {
            return self.make(TokenKind::Unknown, start, lexeme);
        }
        Token {
            kind: TokenKind::CharLiteral,
            lexeme: Rc::from(lexeme),
            processed: Some(value),
            location: start,
        }
    }

    fn scan_string_literal(&mut self, diags: &mut Diagnostics, start: SourceLocation) -> Token {
        let begin = self.pos;
        self.advance(); // opening "
        let mut value = String::new();
        loop {
            if self.at_end() || self.peek() == b'\n' {
                self.report(diags, "unterminated string literal", start.clone());
                let lexeme = std::str::from_utf8(&self.bytes[begin..self.pos]).unwrap();
                return self.make(TokenKind::Unknown, start, lexeme);
            }
            if self.peek() == b'"' {
                self.advance();
                break;
            }
            if self.peek() == b'\\' {
                self.advance();
                match self.peek() {
                    b'n' => {
                        value.push('\n');
                        self.advance();
                    }
                    b't' => {
                        value.push('\t');
                        self.advance();
                    }
                    b'r' => {
                        value.push('\r');
                        self.advance();
                    }
                    b'b' => {
                        value.push('\u{8}');
                        self.advance();
                    }
                    b'f' => {
                        value.push('\u{c}');
                        self.advance();
                    }
                    b'v' => {
                        value.push('\u{b}');
                        self.advance();
                    }
                    b'0' => {
                        value.push('\0');
                        self.advance();
                    }
                    b'\\' => {
                        value.push('\\');
                        self.advance();
                    }
                    b'"' => {
                        value.push('"');
                        self.advance();
                    }
                    b'\'' => {
                        value.push('\'');
                        self.advance();
                    }
                    other => {
                        self.report(
                            diags,
                            &format!("invalid escape sequence '\\{}' in string literal", other as char),
                            start.clone(),
                        );
                        self.advance();
                    }
                }
            } else {
                value.push(self.advance() as char);
            }
        }
        let lexeme = std::str::from_utf8(&self.bytes[begin..self.pos]).unwrap();
        Token {
            kind: TokenKind::StringLiteral,
            lexeme: Rc::from(lexeme),
            processed: Some(value),
            location: start,
        }
    }

    fn scan_delimiter(&mut self, start: SourceLocation) -> Token {
        use TokenKind::*;
        let c = self.advance();
        // `->` is handled as an operator, but `.` is a plain delimiter here
        // and consumed as part of member-access parsing by the parser.
        let kind = match c {
            b'(' => LParen,
            b')' => RParen,
            b'{' => LBrace,
            b'}' => RBrace,
            b'[' => LBracket,
            b']' => RBracket,
            b';' => Semicolon,
            b',' => Comma,
            b'.' => Dot,
            _ => unreachable!(),
        };
        self.make(kind, start, &(c as char).to_string())
    }

    fn scan_hash(&mut self, start: SourceLocation) -> Token {
        self.advance();
        if self.peek() == b'#' {
            self.advance();
            return self.make(TokenKind::HashHash, start, "##");
        }
        self.make(TokenKind::Hash, start, "#")
    }

    fn scan_operator(&mut self, diags: &mut Diagnostics, start: SourceLocation) -> Token {
        use TokenKind::*;
        let begin = self.pos;
        let c = self.advance();
        macro_rules! two {
            ($second:expr, $two_kind:expr, $one_kind:expr) => {
                if self.peek() == $second {
                    self.advance();
                    $two_kind
                } else {
                    $one_kind
                }
            };
        }
        let kind = match c {
            b'=' => two!(b'=', Eq, Assign),
            b'!' => two!(b'=', Ne, Not),
            b'<' => {
                if self.peek() == b'<' {
                    self.advance();
                    two!(b'=', ShlAssign, Shl)
                } else {
                    two!(b'=', Le, Lt)
                }
            }
            b'>' => {
                if self.peek() == b'>' {
                    self.advance();
                    two!(b'=', ShrAssign, Shr)
                } else {
                    two!(b'=', Ge, Gt)
                }
            }
            b'+' => {
                if self.peek() == b'+' {
                    self.advance();
                    Inc
                } else {
                    two!(b'=', PlusAssign, Plus)
                }
            }
            b'-' => {
                if self.peek() == b'-' {
                    self.advance();
                    Dec
                } else if self.peek() == b'>' {
                    self.advance();
                    Arrow
                } else {
                    two!(b'=', MinusAssign, Minus)
                }
            }
            b'*' => two!(b'=', StarAssign, Star),
            b'/' => two!(b'=', SlashAssign, Slash),
            b'%' => two!(b'=', PercentAssign, Percent),
            b'&' => {
                if self.peek() == b'&' {
                    self.advance();
                    AndAnd
                } else {
                    two!(b'=', AmpAssign, Amp)
                }
            }
            b'|' => {
                if self.peek() == b'|' {
                    self.advance();
                    OrOr
                } else {
                    two!(b'=', PipeAssign, Pipe)
                }
            }
            b'^' => two!(b'=', CaretAssign, Caret),
            b'~' => Tilde,
            b'?' => Question,
            b':' => Colon,
            other => {
                self.report(
                    diags,
                    &format!("unrecognized character '{}'", other as char),
                    start.clone(),
                );
                Unknown
            }
        };
        let lexeme = std::str::from_utf8(&self.bytes[begin..self.pos])
            .unwrap_or("")
            .to_string();
        self.make(kind, start, &lexeme)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(src: &str) -> (Vec<Token>, Diagnostics) {
        let mut diags = Diagnostics::default();
        let lexer = Lexer::new(src, "t.c");
        let tokens = lexer.lex_all(&mut diags);
        (tokens, diags)
    }

    #[test]
    fn lexer_totality_ends_in_eof() {
        let (tokens, _) = lex("int main() { return 0; }");
        assert_eq!(tokens.last().unwrap().kind, TokenKind::Eof);
    }

    #[test]
    fn lexer_totality_on_garbage() {
        let (tokens, _) = lex("@@@ $$ \0");
        assert_eq!(tokens.last().unwrap().kind, TokenKind::Eof);
    }

    #[test]
    fn keywords_recognized() {
        let (tokens, _) = lex("int char void struct extern");
        let kinds: Vec<_> = tokens.iter().map(|t| t.kind.clone()).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::KwInt,
                TokenKind::KwChar,
                TokenKind::KwVoid,
                TokenKind::KwStruct,
                TokenKind::KwExtern,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn double_ampersand_and_pipe_are_single_tokens() {
        let (tokens, _) = lex("a && b || c");
        let kinds: Vec<_> = tokens.iter().map(|t| t.kind.clone()).collect();
        assert!(kinds.contains(&TokenKind::AndAnd));
        assert!(kinds.contains(&TokenKind::OrOr));
    }

    #[test]
    fn hex_octal_decimal_literals() {
        let (tokens, diags) = lex("0x1A 010 42 0xFFul");
        assert!(!diags.has_errors());
        assert_eq!(tokens[0].kind, TokenKind::IntLiteral);
        assert_eq!(tokens[1].kind, TokenKind::IntLiteral);
        assert_eq!(tokens[2].kind, TokenKind::IntLiteral);
        assert_eq!(tokens[3].lexeme.as_ref(), "0xFFul");
    }

    #[test]
    fn octal_rejects_89_digits() {
        let (_, diags) = lex("089");
        assert!(diags.has_errors());
    }

    #[test]
    fn float_literals() {
        let (tokens, diags) = lex("3.14 .5 2e10 1.0e-3f");
        assert!(!diags.has_errors());
        for t in &tokens[..4] {
            assert_eq!(t.kind, TokenKind::FloatLiteral);
        }
    }

    #[test]
    fn string_escape_superset() {
        let (tokens, diags) = lex(r#""a\nb\tc\0d\\e""#);
        assert!(!diags.has_errors());
        assert_eq!(tokens[0].processed.as_deref(), Some("a\nb\tc\0d\\e"));
    }

    #[test]
    fn char_literal_rejects_unknown_escape() {
        let (tokens, diags) = lex(r"'\q'");
        assert!(diags.has_errors());
        assert_eq!(tokens[0].kind, TokenKind::Unknown);
    }

    #[test]
    fn unterminated_string_reports_and_continues() {
        let (tokens, diags) = lex("\"abc\nint x;");
        assert!(diags.has_errors());
        assert_eq!(tokens.last().unwrap().kind, TokenKind::Eof);
    }

    #[test]
    fn line_directive_rewrites_filename_and_line() {
        let (tokens, diags) = lex("#line 100 \"other.c\"\nint x;");
        assert!(!diags.has_errors());
        let int_tok = tokens.iter().find(|t| t.kind == TokenKind::KwInt).unwrap();
        assert_eq!(int_tok.location.line, 100);
        assert_eq!(int_tok.location.file, PathBuf::from("other.c"));
    }

    #[test]
    fn malformed_line_directive_reports_error() {
        let (_, diags) = lex("#line\nint x;");
        assert!(diags.has_errors());
    }

    #[test]
    fn line_comments_and_block_comments_skipped() {
        let (tokens, diags) = lex("int /* c */ x; // trailing\n");
        assert!(!diags.has_errors());
        let kinds: Vec<_> = tokens.iter().map(|t| t.kind.clone()).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::KwInt,
                TokenKind::Identifier,
                TokenKind::Semicolon,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn unterminated_block_comment_reports_at_eof() {
        let (_, diags) = lex("int x; /* never closed");
        assert!(diags.has_errors());
    }

    #[test]
    fn arrow_and_struct_operators() {
        let (tokens, _) = lex("p->x a.b");
        let kinds: Vec<_> = tokens.iter().map(|t| t.kind.clone()).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Identifier,
                TokenKind::Arrow,
                TokenKind::Identifier,
                TokenKind::Identifier,
                TokenKind::Dot,
                TokenKind::Identifier,
                TokenKind::Eof,
            ]
        );
    }
}
