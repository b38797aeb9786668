use crate::{
    lang::{
        source_buffer::SourceBuffer,
        tokenizing::{self, Operator, Token},
    },
    runtime::error::{self, ErrorKind, ScriptError},
};

/// An ordered sequence of expressions, as found in a definition or control flow body.
pub type Body = Vec<Expression>;

/// One expression of the language.  Leaf variants map one to one onto the non-structural operator
/// tokens and the literals.  Composite variants carry the properly nested bodies of a definition
/// or a control flow construct.
///
/// The evaluator and the transpiler both dispatch exhaustively over this closed set of variants.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Expression {
    Number(i64),
    String(Vec<u8>),
    Word(String),

    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Mod,

    Less,
    More,
    Equal,
    NotEqual,

    And,
    Or,
    Invert,

    Emit,
    Key,

    Dup,
    Drop,
    Swap,
    Over,
    Rot,

    ToR,
    RFrom,
    RFetch,

    Store,
    Fetch,
    CStore,
    CFetch,
    Alloc,
    Free,

    DotS,
    Bye,

    /// A user word definition, `: name body… ;`.
    Define { name: String, body: Body },

    /// `if body… then`.
    IfThen { body: Body },

    /// `if if-body… else else-body… then`.
    IfElseThen { if_body: Body, else_body: Body },

    /// `begin body… until`.
    BeginUntil { body: Body },

    /// `begin cond-body… while loop-body… repeat`.
    BeginWhileRepeat { cond_body: Body, loop_body: Body },

    /// `begin body… again`.
    BeginAgain { body: Body },
}

/// The source text of a structural token that closes a composite.  Used to report a closer that
/// shows up with nothing open for it to close.
fn closer_text(operator: Operator) -> Option<&'static str> {
    match operator {
        Operator::Semicolon => Some(";"),
        Operator::Then => Some("then"),
        Operator::Else => Some("else"),
        Operator::Until => Some("until"),
        Operator::While => Some("while"),
        Operator::Repeat => Some("repeat"),
        Operator::Again => Some("again"),
        _ => None,
    }
}

/// Map a non-structural operator token onto its expression.  Structural keywords never reach this
/// point; the parser either consumes them as part of a composite or rejects them first.
fn operator_expression(operator: Operator) -> Expression {
    match operator {
        Operator::Add => Expression::Add,
        Operator::Sub => Expression::Sub,
        Operator::Mul => Expression::Mul,
        Operator::Div => Expression::Div,
        Operator::Rem => Expression::Rem,
        Operator::Mod => Expression::Mod,

        Operator::Less => Expression::Less,
        Operator::More => Expression::More,
        Operator::Equal => Expression::Equal,
        Operator::NotEqual => Expression::NotEqual,

        Operator::And => Expression::And,
        Operator::Or => Expression::Or,
        Operator::Invert => Expression::Invert,

        Operator::Emit => Expression::Emit,
        Operator::Key => Expression::Key,

        Operator::Dup => Expression::Dup,
        Operator::Drop => Expression::Drop,
        Operator::Swap => Expression::Swap,
        Operator::Over => Expression::Over,
        Operator::Rot => Expression::Rot,

        Operator::ToR => Expression::ToR,
        Operator::RFrom => Expression::RFrom,
        Operator::RFetch => Expression::RFetch,

        Operator::Store => Expression::Store,
        Operator::Fetch => Expression::Fetch,
        Operator::CStore => Expression::CStore,
        Operator::CFetch => Expression::CFetch,
        Operator::Alloc => Expression::Alloc,
        Operator::Free => Expression::Free,

        Operator::DotS => Expression::DotS,
        Operator::Bye => Expression::Bye,

        Operator::Colon
        | Operator::Semicolon
        | Operator::If
        | Operator::Then
        | Operator::Else
        | Operator::Begin
        | Operator::Until
        | Operator::While
        | Operator::Repeat
        | Operator::Again => {
            unreachable!("structural keyword escaped the parser")
        }
    }
}

/// Pull the next token, failing with UnexpectedEof if the stream ends while a composite is still
/// open.
fn next_token_required(buffer: &mut SourceBuffer) -> error::Result<Token> {
    match tokenizing::next_token(buffer)? {
        Some(token) => Ok(token),
        None => Err(ScriptError::new(
            ErrorKind::UnexpectedEof,
            Some(buffer.location().clone()),
        )),
    }
}

/// Parse the body of a word definition.  The definition's name has already been read.  The body
/// runs until the closing semicolon; a second colon as a direct sibling of the body is rejected.
fn parse_define(buffer: &mut SourceBuffer) -> error::Result<Expression> {
    let name = match next_token_required(buffer)? {
        Token::Word(_, name) => name,
        token => {
            return Err(ScriptError::new(
                ErrorKind::ExpectedWord,
                Some(token.location().clone()),
            ));
        }
    };

    let mut body = Body::new();

    loop {
        let token = next_token_required(buffer)?;

        match &token {
            Token::Operator(_, Operator::Semicolon) => {
                return Ok(Expression::Define { name, body });
            }

            Token::Operator(location, Operator::Colon) => {
                return Err(ScriptError::new(
                    ErrorKind::NestedColon,
                    Some(location.clone()),
                ));
            }

            _ => body.push(parse_token(token, buffer)?),
        }
    }
}

/// Parse the bodies of an if.  The construct is dispatched to `IfThen` or `IfElseThen` the first
/// time a `then` or an `else` shows up as a direct sibling.
fn parse_if(buffer: &mut SourceBuffer) -> error::Result<Expression> {
    let mut if_body = Body::new();

    loop {
        let token = next_token_required(buffer)?;

        match &token {
            Token::Operator(_, Operator::Then) => {
                return Ok(Expression::IfThen { body: if_body });
            }

            Token::Operator(_, Operator::Else) => break,

            _ => if_body.push(parse_token(token, buffer)?),
        }
    }

    let mut else_body = Body::new();

    loop {
        let token = next_token_required(buffer)?;

        match &token {
            Token::Operator(_, Operator::Then) => {
                return Ok(Expression::IfElseThen { if_body, else_body });
            }

            _ => else_body.push(parse_token(token, buffer)?),
        }
    }
}

/// Parse the bodies of a begin loop.  The construct is dispatched to `BeginUntil`,
/// `BeginWhileRepeat`, or `BeginAgain` the first time one of `until`, `while`, or `again` shows up
/// as a direct sibling.
fn parse_begin(buffer: &mut SourceBuffer) -> error::Result<Expression> {
    let mut body = Body::new();

    loop {
        let token = next_token_required(buffer)?;

        match &token {
            Token::Operator(_, Operator::Until) => {
                return Ok(Expression::BeginUntil { body });
            }

            Token::Operator(_, Operator::Again) => {
                return Ok(Expression::BeginAgain { body });
            }

            Token::Operator(_, Operator::While) => break,

            _ => body.push(parse_token(token, buffer)?),
        }
    }

    let cond_body = body;
    let mut loop_body = Body::new();

    loop {
        let token = next_token_required(buffer)?;

        match &token {
            Token::Operator(_, Operator::Repeat) => {
                return Ok(Expression::BeginWhileRepeat {
                    cond_body,
                    loop_body,
                });
            }

            _ => loop_body.push(parse_token(token, buffer)?),
        }
    }
}

/// Turn one token into one expression, pulling further tokens from the buffer when the token
/// opens a definition or a control flow construct.
fn parse_token(token: Token, buffer: &mut SourceBuffer) -> error::Result<Expression> {
    match token {
        Token::Number(_, number) => Ok(Expression::Number(number)),
        Token::String(_, bytes) => Ok(Expression::String(bytes)),
        Token::Word(_, word) => Ok(Expression::Word(word)),

        Token::Operator(_, Operator::Colon) => parse_define(buffer),
        Token::Operator(_, Operator::If) => parse_if(buffer),
        Token::Operator(_, Operator::Begin) => parse_begin(buffer),

        Token::Operator(location, operator) => {
            if let Some(text) = closer_text(operator) {
                Err(ScriptError::new(
                    ErrorKind::UnexpectedCloser(text),
                    Some(location),
                ))
            } else {
                Ok(operator_expression(operator))
            }
        }
    }
}

/// Parse the next top-level expression out of the source, or None once the stream is exhausted.
/// As many tokens as needed are consumed to close every nested construct, so a returned
/// expression is always balanced.
pub fn parse_expression(buffer: &mut SourceBuffer) -> error::Result<Option<Expression>> {
    match tokenizing::next_token(buffer)? {
        Some(token) => Ok(Some(parse_token(token, buffer)?)),
        None => Ok(None),
    }
}
