use std::fmt::Display;

use arcstr::ArcStr;
use thin_vec::ThinVec;

use crate::{
    Binder, Builtin, DType, FuncKind, Function, GlobalVar, Kind, Module, Node, Op, Param, Type,
    Var, arena::Arena, span::U32Span,
};

#[derive(Debug)]
pub enum Error<'s> {
    Unexpected(Class),
    Expected(Class, Found<Token<'s>>),
    InvalidChar(char),
    InvalidToken(Token<'s>),
    InvalidSymbol(&'s str),
    InvalidNumber,
    InvalidVariable,
    DuplicateGlobal(GlobalVar),
    TrailingInput,
}

#[derive(Debug)]
pub struct Found<T>(pub T);

#[derive(Debug)]
pub enum Class {
    Eof,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Symbol,
    Dollar,
    At,
    Number,
}

#[derive(PartialEq, Debug)]
pub enum Token<'s> {
    LParen,
    RParen,
    LBracket,
    RBracket,
    Symbol(&'s str),
    I64(i64),
    F64(f64),
    Dollar,
    Hash,
    At,
}

/// On error, the input remaining at the point of failure is returned along with the error.
type ParseResult<'s, T> = Result<(T, &'s str), (Error<'s>, &'s str)>;

/// A module source parse error, located in the source text.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ParseError {
    pub msg: String,
    pub span: U32Span,
}

impl ParseError {
    fn new(src: &str, error: Error, at: &str) -> Self {
        let at = skip_trivia(at);
        let start = src.len() - at.len();
        let len = if at.is_empty() {
            0
        } else {
            symbol_end(at).max(1)
        };

        Self {
            msg: error.to_string(),
            span: U32Span::from(start..start + len),
        }
    }
}

impl Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at {:?}", self.msg, self.span)
    }
}

impl std::error::Error for ParseError {}

/// Parse a module in the s-expression text format:
///
/// ```text
/// (module
///     (kernel @add_one (($a (tensor f32 [16])) ($b (tensor f32 [16])))
///         (for ($i) 0 16
///             (store $b [$i] (+ (load $a [$i]) 1.0))
///         )
///     )
///     (func @main (($x (tensor f32 [16])))
///         (block
///             (let $y (dispatch @add_one $x))
///             $y
///         )
///     )
/// )
/// ```
///
/// Line comments start with `//`.
/// Whether dispatch callees are defined is not checked here.
pub fn parse_module(src: &str) -> Result<Module, ParseError> {
    parse_root(src).map_err(|(error, at)| ParseError::new(src, error, at))
}

fn parse_root(src: &str) -> Result<Module, (Error<'_>, &str)> {
    let (module, next) = parse_paren_delimited(src, parse_module_body)?;
    let rest = skip_trivia(next);
    if !rest.is_empty() {
        return Err((Error::TrailingInput, rest));
    }

    Ok(module)
}

fn parse_module_body(next: &str) -> ParseResult<'_, Module> {
    let (_, mut next) = parse_keyword(next, "module")?;
    let mut module = Module::new();

    while let (Token::LParen, _) = parse_raw_token(next)? {
        let at = next;
        let ((global, func), next_next) = parse_paren_delimited(next, parse_function)?;
        if module.contains(&global) {
            return Err((Error::DuplicateGlobal(global), at));
        }
        module.insert(global, func);
        next = next_next;
    }

    Ok((module, next))
}

fn parse_function(next: &str) -> ParseResult<'_, (GlobalVar, Function)> {
    let (kind, next) = match parse_symbol(next)? {
        ("func", next) => (FuncKind::Orchestration, next),
        ("kernel", next) => (FuncKind::Kernel, next),
        (sym, _) => return Err((Error::InvalidSymbol(sym), next)),
    };
    let (global, next) = parse_global(next)?;
    let (params, next) = parse_paren_delimited(next, |next| parse_many(next, parse_param))?;

    let mut parser = Parser::default();
    let (body, next) = parser.parse(next)?;

    Ok((
        (
            global,
            Function::new(kind, params.into(), body, parser.arena),
        ),
        next,
    ))
}

fn parse_param(next: &str) -> ParseResult<'_, Param> {
    parse_paren_delimited(next, |next| {
        let (var, next) = parse_dollar_var(next)?;
        let (ty, next) = parse_type(next)?;
        Ok((
            Param {
                binder: Binder { var },
                ty,
            },
            next,
        ))
    })
}

fn parse_type(next: &str) -> ParseResult<'_, Type> {
    parse_paren_delimited(next, |next| match parse_symbol(next)? {
        ("scalar", next) => {
            let (dtype, next) = parse_dtype(next)?;
            Ok((Type::Scalar(dtype), next))
        }
        ("tensor", next) => {
            let (dtype, next) = parse_dtype(next)?;
            let (shape, next) = parse_bracket_delimited(next, |next| parse_many(next, parse_i64))?;
            Ok((Type::Tensor(dtype, shape.into()), next))
        }
        (sym, _) => Err((Error::InvalidSymbol(sym), next)),
    })
}

/// Parses the body of one function into its own arena.
#[derive(Default)]
struct Parser {
    arena: Arena,
}

impl Parser {
    fn parse<'s>(&mut self, next: &'s str) -> ParseResult<'s, Node> {
        match parse_token(next)? {
            (Token::LParen, inner) => {
                let (node, inner) = self.parse_parenthesized(inner)?;
                let (_, inner) = parse_expect(inner, Token::RParen, Class::RParen)?;
                Ok((node, inner))
            }
            (Token::Dollar, _) => {
                let (var, next) = parse_dollar_var(next)?;
                Ok((self.make_node(Kind::Var(var)), next))
            }
            (Token::At, _) => {
                let (global, next) = parse_global(next)?;
                Ok((self.make_node(Kind::Global(global)), next))
            }
            (Token::Hash, after) => match parse_token(after)? {
                (Token::Symbol("u"), after) => Ok((self.make_node(Kind::Unit), after)),
                (token, _) => Err((Error::InvalidToken(token), after)),
            },
            (Token::I64(num), next) => Ok((self.make_node(Kind::I64(num)), next)),
            (Token::F64(num), next) => Ok((self.make_node(Kind::F64(num)), next)),
            (token, _) => Err((Error::InvalidToken(token), next)),
        }
    }

    fn parse_parenthesized<'s>(&mut self, next: &'s str) -> ParseResult<'s, Node> {
        let at = next;
        match parse_symbol(next)? {
            ("extern", next) => {
                let (name, next) = parse_symbol(next)?;
                Ok((self.make_node(Kind::Extern(ArcStr::from(name))), next))
            }
            ("dispatch", next) => self.parse_call(Op::Dispatch, next),
            ("call", next) => {
                let (name, next) = parse_symbol(next)?;
                self.parse_call(Op::Named(ArcStr::from(name)), next)
            }
            ("tuple", next) => {
                let (elements, next) = self.parse_nodes(next)?;
                Ok((self.make_node(Kind::Tuple(elements)), next))
            }
            ("let", next) => {
                let (var, next) = parse_dollar_var(next)?;
                let (value, next) = self.parse(next)?;
                Ok((self.make_node(Kind::Let(Binder { var }, value)), next))
            }
            ("block", next) => {
                let (body, next) = self.parse_nodes(next)?;
                Ok((self.make_node(Kind::Block(body)), next))
            }
            ("if", next) => {
                let (cond, next) = self.parse(next)?;
                let (then, next) = self.parse(next)?;
                let (otherwise, next) = self.parse(next)?;
                Ok((self.make_node(Kind::If(cond, then, otherwise)), next))
            }
            ("for", next) => {
                let (var, next) = parse_paren_delimited(next, parse_dollar_var)?;
                let (min, next) = self.parse(next)?;
                let (extent, next) = self.parse(next)?;
                let (body, next) = self.parse_nodes(next)?;
                Ok((
                    self.make_node(Kind::For(Binder { var }, min, extent, body)),
                    next,
                ))
            }
            ("load", next) => {
                let (buffer, next) = parse_dollar_var(next)?;
                let (indices, next) = parse_bracket_delimited(next, |next| self.parse_nodes(next))?;
                Ok((self.make_node(Kind::Load(buffer, indices)), next))
            }
            ("store", next) => {
                let (buffer, next) = parse_dollar_var(next)?;
                let (indices, next) = parse_bracket_delimited(next, |next| self.parse_nodes(next))?;
                let (value, next) = self.parse(next)?;
                Ok((self.make_node(Kind::Store(buffer, indices, value)), next))
            }
            (sym, next) => match Builtin::from_symbol(sym) {
                Some(builtin) => self.parse_call(Op::Builtin(builtin), next),
                None => Err((Error::InvalidSymbol(sym), at)),
            },
        }
    }

    fn parse_call<'s>(&mut self, op: Op, next: &'s str) -> ParseResult<'s, Node> {
        let (args, next) = self.parse_nodes(next)?;
        Ok((self.make_node(Kind::Call(op, args)), next))
    }

    fn parse_nodes<'s>(&mut self, next: &'s str) -> ParseResult<'s, ThinVec<Node>> {
        let (nodes, next) = parse_many(next, |next| self.parse(next))?;
        Ok((nodes.into(), next))
    }

    fn make_node(&mut self, kind: Kind) -> Node {
        self.arena.add(kind)
    }
}

/// Parse items until the enclosing `)` or `]`, or the end of input.
fn parse_many<'s, T>(
    mut next: &'s str,
    mut item_fn: impl FnMut(&'s str) -> ParseResult<'s, T>,
) -> ParseResult<'s, Vec<T>> {
    let mut items = vec![];
    loop {
        match item_fn(next) {
            Ok((item, next_next)) => {
                next = next_next;
                items.push(item);
            }
            Err((Error::Unexpected(Class::Eof | Class::RParen), _)) => {
                return Ok((items, next));
            }
            Err(error) => {
                return Err(error);
            }
        }
    }
}

/// Parse `(`, then closure, then `)`
fn parse_paren_delimited<'s, T>(
    next: &'s str,
    mut item_fn: impl FnMut(&'s str) -> ParseResult<'s, T>,
) -> ParseResult<'s, T> {
    let (_, next) = parse_expect(next, Token::LParen, Class::LParen)?;
    let (value, next) = item_fn(next)?;
    let (_, next) = parse_expect(next, Token::RParen, Class::RParen)?;
    Ok((value, next))
}

fn parse_bracket_delimited<'s, T>(
    next: &'s str,
    mut item_fn: impl FnMut(&'s str) -> ParseResult<'s, T>,
) -> ParseResult<'s, T> {
    let (_, next) = parse_expect(next, Token::LBracket, Class::LBracket)?;
    let (value, next) = item_fn(next)?;
    let (_, next) = parse_expect(next, Token::RBracket, Class::RBracket)?;
    Ok((value, next))
}

fn parse_keyword<'s>(next: &'s str, keyword: &str) -> ParseResult<'s, ()> {
    match parse_symbol(next)? {
        (sym, next) if sym == keyword => Ok(((), next)),
        (sym, _) => Err((Error::InvalidSymbol(sym), next)),
    }
}

fn parse_symbol(next: &str) -> ParseResult<'_, &str> {
    match parse_token(next)? {
        (Token::Symbol(sym), next) => Ok((sym, next)),
        (token, _) => Err((Error::Expected(Class::Symbol, Found(token)), next)),
    }
}

fn parse_dollar_var(next: &str) -> ParseResult<'_, Var> {
    let after = match parse_token(next)? {
        (Token::Dollar, after) => after,
        (token, _) => return Err((Error::Expected(Class::Dollar, Found(token)), next)),
    };
    match parse_raw_token(after)? {
        (Token::Symbol(sym), next) => match alpha_to_u32(sym) {
            Some(index) => Ok((Var(index), next)),
            None => Err((Error::InvalidVariable, after)),
        },
        (token, _) => Err((Error::InvalidToken(token), after)),
    }
}

fn parse_global(next: &str) -> ParseResult<'_, GlobalVar> {
    let after = match parse_token(next)? {
        (Token::At, after) => after,
        (token, _) => return Err((Error::Expected(Class::At, Found(token)), next)),
    };
    match parse_raw_token(after)? {
        (Token::Symbol(sym), next) => Ok((GlobalVar::new(sym), next)),
        (token, _) => Err((Error::InvalidToken(token), after)),
    }
}

fn parse_dtype(next: &str) -> ParseResult<'_, DType> {
    let (sym, after) = parse_symbol(next)?;
    match sym.parse::<DType>() {
        Ok(dtype) => Ok((dtype, after)),
        Err(()) => Err((Error::InvalidSymbol(sym), next)),
    }
}

fn parse_i64(next: &str) -> ParseResult<'_, i64> {
    match parse_token(next)? {
        (Token::I64(n), next) => Ok((n, next)),
        (token, _) => Err((Error::Expected(Class::Number, Found(token)), next)),
    }
}

fn parse_expect<'s>(next: &'s str, expected: Token, class: Class) -> ParseResult<'s, ()> {
    let (token, next_next) = parse_raw_token(next)?;

    if token == expected {
        Ok(((), next_next))
    } else {
        match token {
            Token::RParen | Token::RBracket => Err((Error::Unexpected(Class::RParen), next)),
            _ => Err((Error::Expected(class, Found(token)), next)),
        }
    }
}

fn parse_token(next: &str) -> ParseResult<'_, Token<'_>> {
    match parse_raw_token(next)? {
        (Token::RParen | Token::RBracket, _) => Err((Error::Unexpected(Class::RParen), next)),
        (token, next) => Ok((token, next)),
    }
}

fn parse_raw_token(next: &str) -> ParseResult<'_, Token<'_>> {
    let next = skip_trivia(next);
    let mut chars = next.chars();

    match chars.next() {
        None => Err((Error::Unexpected(Class::Eof), next)),
        Some('(') => Ok((Token::LParen, chars.as_str())),
        Some(')') => Ok((Token::RParen, chars.as_str())),
        Some('[') => Ok((Token::LBracket, chars.as_str())),
        Some(']') => Ok((Token::RBracket, chars.as_str())),
        Some('$') => Ok((Token::Dollar, chars.as_str())),
        Some('#') => Ok((Token::Hash, chars.as_str())),
        Some('@') => Ok((Token::At, chars.as_str())),
        Some(char)
            if char.is_ascii_digit()
                || (char == '-' && chars.as_str().starts_with(|c: char| c.is_ascii_digit())) =>
        {
            let end = symbol_end(next);
            match interpret_number(&next[..end]) {
                Some(token) => Ok((token, &next[end..])),
                None => Err((Error::InvalidNumber, next)),
            }
        }
        Some(char) if char.is_ascii_graphic() => {
            let end = symbol_end(next);
            Ok((Token::Symbol(&next[..end]), &next[end..]))
        }
        Some(char) => Err((Error::InvalidChar(char), next)),
    }
}

fn skip_trivia(mut next: &str) -> &str {
    loop {
        next = next.trim_start();
        match next.strip_prefix("//") {
            Some(comment) => {
                next = match comment.find('\n') {
                    Some(newline) => &comment[newline..],
                    None => "",
                };
            }
            None => return next,
        }
    }
}

fn symbol_end(next: &str) -> usize {
    next.find(|c: char| c.is_whitespace() || matches!(c, '(' | ')' | '[' | ']'))
        .unwrap_or(next.len())
}

fn interpret_number(num: &str) -> Option<Token<'_>> {
    if num.contains(['.', 'e']) {
        // Overflowing literals have no textual form to print back to
        num.parse::<f64>()
            .ok()
            .filter(|float| float.is_finite())
            .map(Token::F64)
    } else {
        num.parse().ok().map(Token::I64)
    }
}

/// The inverse of [crate::display::AsAlpha]: `a` is 0, `z` is 25, `aa` is 26.
fn alpha_to_u32(sym: &str) -> Option<u32> {
    if sym.is_empty() {
        return None;
    }

    let mut n: u32 = 0;
    for char in sym.chars() {
        if !char.is_ascii_lowercase() {
            return None;
        }
        n = n
            .checked_mul(26)?
            .checked_add(u32::from(char) - u32::from('a') + 1)?;
    }

    Some(n - 1)
}

impl Display for Error<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unexpected(Class::Eof) => write!(f, "unexpected end of input"),
            Self::Unexpected(class) => write!(f, "unexpected {class}"),
            Self::Expected(class, Found(token)) => write!(f, "expected {class}, found {token}"),
            Self::InvalidChar(char) => write!(f, "invalid character `{char}`"),
            Self::InvalidToken(token) => write!(f, "unexpected {token}"),
            Self::InvalidSymbol(sym) => write!(f, "unknown symbol `{sym}`"),
            Self::InvalidNumber => write!(f, "invalid number"),
            Self::InvalidVariable => write!(f, "invalid variable name"),
            Self::DuplicateGlobal(global) => write!(f, "{global} is already defined"),
            Self::TrailingInput => write!(f, "unexpected input after module"),
        }
    }
}

impl Display for Class {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Eof => write!(f, "end of input"),
            Self::LParen => write!(f, "`(`"),
            Self::RParen => write!(f, "`)`"),
            Self::LBracket => write!(f, "`[`"),
            Self::RBracket => write!(f, "`]`"),
            Self::Symbol => write!(f, "symbol"),
            Self::Dollar => write!(f, "variable"),
            Self::At => write!(f, "global"),
            Self::Number => write!(f, "number"),
        }
    }
}

impl Display for Token<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LParen => write!(f, "`(`"),
            Self::RParen => write!(f, "`)`"),
            Self::LBracket => write!(f, "`[`"),
            Self::RBracket => write!(f, "`]`"),
            Self::Symbol(sym) => write!(f, "`{sym}`"),
            Self::I64(num) => write!(f, "`{num}`"),
            Self::F64(num) => write!(f, "`{num:?}`"),
            Self::Dollar => write!(f, "`$`"),
            Self::Hash => write!(f, "`#`"),
            Self::At => write!(f, "`@`"),
        }
    }
}
