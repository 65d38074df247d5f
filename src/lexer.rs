// file: src/lexer.rs

use std::collections::HashMap;
use std::rc::Rc;

use logos::Logos;
use tracing::debug;

use crate::diagnostics::LexError;
use crate::token::{Keyword, SourceLocation, Spelling, Token, TokenKind};

/// `logos` 生成的原始扫描器只负责“这段文本是什么”，
/// 位置、关键字和错误由外层的 `Lexer` 负责。
///
/// 标识符的字符类把所有非 ASCII 字符都当作字母。这是一个很粗糙的规则，
/// 但足以让中文关键字（以及中文标识符）被完整地扫描成一个单词。
#[derive(Logos, Debug, Clone, Copy, PartialEq)]
#[logos(skip r"([ \t\r\n]|#[^\n]*)+")]
enum RawToken {
    #[regex(r"([A-Za-z_]|[^\x00-\x7F])([A-Za-z0-9_]|[^\x00-\x7F])*")]
    Word,

    // 没有指数，也没有符号：负数由语法分析阶段的一元 `-` 产生
    #[regex(r"[0-9]+", fraction)]
    Number,

    // `\` 只是保护下一个字符不结束字符串，转义序列不会被解码
    #[regex(r#""([^"\\\n]|\\(.|\n))*""#)]
    Str,
    #[regex(r#""([^"\\\n]|\\(.|\n))*\\?"#)]
    UnterminatedStr,

    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("=")]
    Assign,
    #[token("==")]
    EqualEqual,
    #[token("!=")]
    BangEqual,
    #[token("<")]
    Less,
    #[token("<=")]
    LessEqual,
    #[token(">")]
    Greater,
    #[token(">=")]
    GreaterEqual,
    #[token("&&")]
    AndAnd,
    #[token("||")]
    OrOr,
    #[token("&")]
    LoneAmp,
    #[token("|")]
    LonePipe,
    #[token("!")]
    Bang,
    #[token(".")]
    Dot,
    #[token(",")]
    Comma,
    #[token(";")]
    Semicolon,
    #[token(":")]
    Colon,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
}

/// 词法分析器。把源代码转换成一个惰性的 Token 序列。
///
/// 它在一次编译中存活：拥有扫描位置、行列计数、一个单 Token 的回退槽
/// （用于一个 Token 的前瞻），以及只增不减的诊断列表。
/// 错误只被收集，从不抛出，扫描总会进行到文件末尾。
pub struct Lexer<'src> {
    source: &'src str,
    raw: logos::Lexer<'src, RawToken>,
    file: Rc<str>,

    line: u32,
    /// 当前行第一个字节的位置
    line_start: usize,
    /// 行计数已经处理到的字节位置，只会向前移动
    counted_to: usize,

    /// 前瞻的 Token（`peek_token` 填充，`next_token` 取走）
    peeked: Option<Token>,
    /// 双语关键字表，构造时建立一次
    keywords: HashMap<&'static str, (TokenKind, Spelling)>,
    errors: Vec<LexError>,
    /// 迭代器接口已经交出过 EOF
    exhausted: bool,
}

impl<'src> Lexer<'src> {
    pub fn new(source: &'src str, file: &str) -> Self {
        Lexer {
            source,
            raw: RawToken::lexer(source),
            file: Rc::from(file),
            line: 1,
            line_start: 0,
            counted_to: 0,
            peeked: None,
            keywords: keyword_table(),
            errors: Vec::new(),
            exhausted: false,
        }
    }

    /// 取出下一个 Token。到达文件末尾后会一直返回 EOF。
    pub fn next_token(&mut self) -> Token {
        match self.peeked.take() {
            Some(token) => token,
            None => self.scan_token(),
        }
    }

    /// 查看下一个 Token 但不消耗它。
    pub fn peek_token(&mut self) -> &Token {
        let token = match self.peeked.take() {
            Some(token) => token,
            None => self.scan_token(),
        };
        self.peeked.insert(token)
    }

    pub fn is_at_end(&mut self) -> bool {
        self.peek_token().is_eof()
    }

    /// 一直扫描到文件末尾，返回的列表以唯一的一个 EOF 结尾。
    pub fn tokenize(&mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token();
            let done = token.is_eof();
            tokens.push(token);
            if done {
                break;
            }
        }
        debug!(count = tokens.len(), errors = self.errors.len(), "tokenized source");
        tokens
    }

    pub fn errors(&self) -> &[LexError] {
        &self.errors
    }

    pub fn file(&self) -> &Rc<str> {
        &self.file
    }

    fn scan_token(&mut self) -> Token {
        let Some(result) = self.raw.next() else {
            let end = self.source.len();
            let location = self.location_at(end);
            return Token::new(TokenKind::Eof, "", location);
        };

        let span = self.raw.span();
        let source = self.source;
        let text = &source[span.clone()];
        let location = self.location_at(span.start);

        let token = match result {
            Ok(RawToken::Word) => self.word(text, location),
            Ok(RawToken::Number) => Token::new(TokenKind::Number, text, location),
            Ok(RawToken::Str) => {
                // 去掉两侧的引号
                Token::new(TokenKind::String, &text[1..text.len() - 1], location)
            }
            Ok(RawToken::UnterminatedStr) => {
                self.errors.push(LexError::UnterminatedString { location: location.clone() });
                Token::new(TokenKind::Error, text, location)
            }
            Ok(RawToken::LoneAmp) => self.lone_operator('&', location),
            Ok(RawToken::LonePipe) => self.lone_operator('|', location),
            Ok(raw) => Token::new(punctuation_kind(raw), text, location),
            Err(()) => {
                self.errors.push(LexError::UnexpectedCharacter {
                    text: text.to_string(),
                    location: location.clone(),
                });
                Token::new(TokenKind::Error, text, location)
            }
        };

        // 字符串里被转义的换行也要计入行号
        self.location_at(span.end);
        token
    }

    /// 标识符或关键字：先整体扫描，再查关键字表。
    fn word(&self, text: &str, location: SourceLocation) -> Token {
        match self.keywords.get(text) {
            Some(&(kind, spelling)) => Token {
                kind,
                lexeme: text.to_string(),
                location,
                spelling: Some(spelling),
            },
            None => Token::new(TokenKind::Identifier, text, location),
        }
    }

    fn lone_operator(&mut self, ch: char, location: SourceLocation) -> Token {
        self.errors.push(LexError::LoneOperator { ch, location: location.clone() });
        Token::new(TokenKind::Error, ch.to_string(), location)
    }

    /// 把行计数推进到 `offset`，并返回该处的位置。
    ///
    /// `offset` 必须单调不减，logos 的扫描位置保证了这一点。
    fn location_at(&mut self, offset: usize) -> SourceLocation {
        let pending = &self.source.as_bytes()[self.counted_to..offset];
        for (i, byte) in pending.iter().enumerate() {
            if *byte == b'\n' {
                self.line += 1;
                self.line_start = self.counted_to + i + 1;
            }
        }
        self.counted_to = offset;

        let column = self.source[self.line_start..offset].chars().count() as u32 + 1;
        SourceLocation::new(Rc::clone(&self.file), self.line, column)
    }
}

/// 惰性序列接口：依次产出 Token，EOF 之后结束。
impl Iterator for Lexer<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        if self.exhausted {
            return None;
        }
        let token = self.next_token();
        self.exhausted = token.is_eof();
        Some(token)
    }
}

/// 数字后面紧跟 `.` 和至少一位数字时，把小数部分也吃进来。
/// `1.` 或 `1.e5` 中的 `.` 不属于数字。
fn fraction(lex: &mut logos::Lexer<RawToken>) {
    let rest = lex.remainder().as_bytes();
    if rest.len() >= 2 && rest[0] == b'.' && rest[1].is_ascii_digit() {
        let digits = rest[1..].iter().take_while(|b| b.is_ascii_digit()).count();
        lex.bump(1 + digits);
    }
}

fn keyword_table() -> HashMap<&'static str, (TokenKind, Spelling)> {
    let mut table = HashMap::new();
    for keyword in Keyword::ALL {
        table.insert(keyword.latin(), (TokenKind::Keyword(keyword), Spelling::Latin));
        table.insert(keyword.chinese(), (TokenKind::Keyword(keyword), Spelling::Chinese));
    }
    // 布尔值
    table.insert("true", (TokenKind::Bool, Spelling::Latin));
    table.insert("false", (TokenKind::Bool, Spelling::Latin));
    table.insert("真", (TokenKind::Bool, Spelling::Chinese));
    table.insert("假", (TokenKind::Bool, Spelling::Chinese));
    table
}

fn punctuation_kind(raw: RawToken) -> TokenKind {
    match raw {
        RawToken::Plus => TokenKind::Plus,
        RawToken::Minus => TokenKind::Minus,
        RawToken::Star => TokenKind::Star,
        RawToken::Slash => TokenKind::Slash,
        RawToken::Percent => TokenKind::Percent,
        RawToken::Assign => TokenKind::Assign,
        RawToken::EqualEqual => TokenKind::EqualEqual,
        RawToken::BangEqual => TokenKind::BangEqual,
        RawToken::Less => TokenKind::Less,
        RawToken::LessEqual => TokenKind::LessEqual,
        RawToken::Greater => TokenKind::Greater,
        RawToken::GreaterEqual => TokenKind::GreaterEqual,
        RawToken::AndAnd => TokenKind::AndAnd,
        RawToken::OrOr => TokenKind::OrOr,
        RawToken::Bang => TokenKind::Bang,
        RawToken::Dot => TokenKind::Dot,
        RawToken::Comma => TokenKind::Comma,
        RawToken::Semicolon => TokenKind::Semicolon,
        RawToken::Colon => TokenKind::Colon,
        RawToken::LParen => TokenKind::LParen,
        RawToken::RParen => TokenKind::RParen,
        RawToken::LBrace => TokenKind::LBrace,
        RawToken::RBrace => TokenKind::RBrace,
        RawToken::LBracket => TokenKind::LBracket,
        RawToken::RBracket => TokenKind::RBracket,
        // 以下几种在 scan_token 中单独处理
        RawToken::Word
        | RawToken::Number
        | RawToken::Str
        | RawToken::UnterminatedStr
        | RawToken::LoneAmp
        | RawToken::LonePipe => TokenKind::Error,
    }
}
