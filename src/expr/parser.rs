//! Recursive-descent parser producing the expression AST.
//!
//! Precedence, loosest first: `or`, `and`, `not`, comparisons, primaries.
//! Comparisons do not chain (`a < b < c` is a parse error).

use super::eval::Value;
use super::lexer::Token;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    And,
    Or,
}

#[derive(Debug, Clone)]
pub enum Ast {
    Literal(Value),
    Field(Vec<String>),
    Not(Box<Ast>),
    Binary {
        op: BinaryOp,
        lhs: Box<Ast>,
        rhs: Box<Ast>,
    },
    Call {
        name: String,
        args: Vec<Ast>,
    },
}

/// Known functions and their arity.
const FUNCTIONS: &[(&str, usize)] = &[
    ("exists", 1),
    ("istrue", 1),
    ("isfalse", 1),
    ("contains", 2),
    ("seadex", 0),
];

pub fn parse(tokens: &[Token]) -> Result<Ast, String> {
    let mut parser = Parser { tokens, pos: 0 };
    let ast = parser.or_expr()?;
    if parser.pos != tokens.len() {
        return Err(format!(
            "unexpected trailing input at token {}",
            parser.pos + 1
        ));
    }
    Ok(ast)
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<&Token> {
        let token = self.tokens.get(self.pos);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn or_expr(&mut self) -> Result<Ast, String> {
        let mut lhs = self.and_expr()?;
        while self.eat(&Token::Or) {
            let rhs = self.and_expr()?;
            lhs = Ast::Binary {
                op: BinaryOp::Or,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn and_expr(&mut self) -> Result<Ast, String> {
        let mut lhs = self.not_expr()?;
        while self.eat(&Token::And) {
            let rhs = self.not_expr()?;
            lhs = Ast::Binary {
                op: BinaryOp::And,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn not_expr(&mut self) -> Result<Ast, String> {
        if self.eat(&Token::Not) {
            let inner = self.not_expr()?;
            return Ok(Ast::Not(Box::new(inner)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Ast, String> {
        let lhs = self.primary()?;
        let op = match self.peek() {
            Some(Token::Eq) => BinaryOp::Eq,
            Some(Token::Ne) => BinaryOp::Ne,
            Some(Token::Lt) => BinaryOp::Lt,
            Some(Token::Le) => BinaryOp::Le,
            Some(Token::Gt) => BinaryOp::Gt,
            Some(Token::Ge) => BinaryOp::Ge,
            Some(Token::In) => BinaryOp::In,
            _ => return Ok(lhs),
        };
        self.pos += 1;
        let rhs = self.primary()?;
        Ok(Ast::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        })
    }

    fn primary(&mut self) -> Result<Ast, String> {
        let token = self
            .bump()
            .ok_or_else(|| "unexpected end of expression".to_string())?
            .clone();
        match token {
            Token::Num(n) => Ok(Ast::Literal(Value::Num(n))),
            Token::Str(s) => Ok(Ast::Literal(Value::Str(s))),
            Token::True => Ok(Ast::Literal(Value::Bool(true))),
            Token::False => Ok(Ast::Literal(Value::Bool(false))),
            Token::Null => Ok(Ast::Literal(Value::Null)),
            Token::LParen => {
                let inner = self.or_expr()?;
                if !self.eat(&Token::RParen) {
                    return Err("missing closing parenthesis".to_string());
                }
                Ok(inner)
            }
            Token::LBracket => self.list_literal(),
            Token::Ident(name) => {
                if self.peek() == Some(&Token::LParen) {
                    self.pos += 1;
                    return self.call(name);
                }
                self.field_path(name)
            }
            other => Err(format!("unexpected token {other:?}")),
        }
    }

    fn list_literal(&mut self) -> Result<Ast, String> {
        let mut items = Vec::new();
        if self.eat(&Token::RBracket) {
            return Ok(Ast::Literal(Value::List(items)));
        }
        loop {
            match self.bump().cloned() {
                Some(Token::Num(n)) => items.push(Value::Num(n)),
                Some(Token::Str(s)) => items.push(Value::Str(s)),
                Some(Token::True) => items.push(Value::Bool(true)),
                Some(Token::False) => items.push(Value::Bool(false)),
                Some(Token::Null) => items.push(Value::Null),
                other => return Err(format!("expected a literal in list, found {other:?}")),
            }
            if self.eat(&Token::RBracket) {
                return Ok(Ast::Literal(Value::List(items)));
            }
            if !self.eat(&Token::Comma) {
                return Err("expected `,` or `]` in list literal".to_string());
            }
        }
    }

    fn field_path(&mut self, first: String) -> Result<Ast, String> {
        let mut path = vec![first];
        while self.eat(&Token::Dot) {
            match self.bump().cloned() {
                Some(Token::Ident(segment)) => path.push(segment),
                other => {
                    return Err(format!("expected a field name after `.`, found {other:?}"));
                }
            }
        }
        Ok(Ast::Field(path))
    }

    fn call(&mut self, name: String) -> Result<Ast, String> {
        let lowered = name.to_ascii_lowercase();
        let Some((_, arity)) = FUNCTIONS.iter().find(|(n, _)| *n == lowered) else {
            return Err(format!("unknown function `{name}`"));
        };

        let mut args = Vec::new();
        if !self.eat(&Token::RParen) {
            loop {
                args.push(self.or_expr()?);
                if self.eat(&Token::RParen) {
                    break;
                }
                if !self.eat(&Token::Comma) {
                    return Err(format!("expected `,` or `)` in call to `{name}`"));
                }
            }
        }

        if args.len() != *arity {
            return Err(format!(
                "`{name}` takes {arity} argument(s), found {}",
                args.len()
            ));
        }
        Ok(Ast::Call {
            name: lowered,
            args,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::lexer::tokenize;
    use super::*;

    fn parse_str(source: &str) -> Result<Ast, String> {
        parse(&tokenize(source).unwrap())
    }

    #[test]
    fn and_binds_tighter_than_or() {
        let ast = parse_str("a or b and c").unwrap();
        match ast {
            Ast::Binary { op: BinaryOp::Or, rhs, .. } => match *rhs {
                Ast::Binary { op: BinaryOp::And, .. } => {}
                other => panic!("expected and on the right, got {other:?}"),
            },
            other => panic!("expected or at the root, got {other:?}"),
        }
    }

    #[test]
    fn parentheses_override_precedence() {
        let ast = parse_str("(a or b) and c").unwrap();
        match ast {
            Ast::Binary { op: BinaryOp::And, lhs, .. } => match *lhs {
                Ast::Binary { op: BinaryOp::Or, .. } => {}
                other => panic!("expected or on the left, got {other:?}"),
            },
            other => panic!("expected and at the root, got {other:?}"),
        }
    }

    #[test]
    fn dotted_paths_collect_segments() {
        let ast = parse_str("stream.seadex.isBest").unwrap();
        match ast {
            Ast::Field(path) => assert_eq!(path, vec!["stream", "seadex", "isBest"]),
            other => panic!("expected a field, got {other:?}"),
        }
    }

    #[test]
    fn function_arity_is_checked() {
        assert!(parse_str("exists()").is_err());
        assert!(parse_str("contains('a')").is_err());
        assert!(parse_str("seadex()").is_ok());
    }

    #[test]
    fn unknown_function_is_a_compile_error() {
        assert!(parse_str("frobnicate(a)").is_err());
    }

    #[test]
    fn list_literals_parse() {
        let ast = parse_str("releaseGroup in ['SubsPlease', 'Erai-raws']").unwrap();
        match ast {
            Ast::Binary { op: BinaryOp::In, rhs, .. } => match *rhs {
                Ast::Literal(Value::List(items)) => assert_eq!(items.len(), 2),
                other => panic!("expected a list literal, got {other:?}"),
            },
            other => panic!("expected in at the root, got {other:?}"),
        }
    }

    #[test]
    fn trailing_tokens_are_rejected() {
        assert!(parse_str("a b").is_err());
    }
}
