use super::{BinaryOp, ExprNode, FunctionLibrary};
use crate::*;

/*
 *  Syntax:
 *  expr    = term (('+' | '-') term)*
 *  term    = unary (('*' | '/') unary)*
 *  unary   = '-' unary | postfix
 *  postfix = primary ('.' swizzle)*
 *  primary = number | 'true' | 'false' | ident | ident '(' args? ')' | '(' expr ')'
 *  args    = expr (',' expr)*
 */
pub(super) struct Parser<'a> {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    col: usize,
    container: &'a VariableContainer,
    library: &'a FunctionLibrary,
}

impl<'a> Parser<'a> {
    pub(super) fn new(
        src: &str,
        container: &'a VariableContainer,
        library: &'a FunctionLibrary,
    ) -> Self {
        Self {
            chars: src.chars().collect(),
            pos: 0,
            line: 1,
            col: 1,
            container,
            library,
        }
    }

    fn next_char(&mut self) -> Option<char> {
        let c = self.chars.get(self.pos).cloned();
        if c == Some('\n') {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        self.pos += 1;
        c
    }
    fn peek(&self, n: usize) -> Option<char> {
        self.chars.get(self.pos + n).cloned()
    }
    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek(0) {
            if c.is_whitespace() {
                self.next_char();
            } else {
                break;
            }
        }
    }
    fn error(&self, msg: impl Into<String>) -> CompileError {
        CompileError::parse(msg, self.line, self.col)
    }
    fn expect(&mut self, c: char) -> Result<(), CompileError> {
        self.skip_whitespace();
        match self.peek(0) {
            Some(x) if x == c => {
                self.next_char();
                Ok(())
            }
            Some(x) => Err(self.error(format!("expected `{}` but found `{}`", c, x))),
            None => Err(self.error(format!("expected `{}` but found end of input", c))),
        }
    }

    pub(super) fn parse(mut self) -> Result<ExprNode, CompileError> {
        let node = self.parse_expr()?;
        self.skip_whitespace();
        if let Some(c) = self.peek(0) {
            return Err(self.error(format!("unexpected `{}`", c)));
        }
        Ok(node)
    }

    fn parse_expr(&mut self) -> Result<ExprNode, CompileError> {
        let mut lhs = self.parse_term()?;
        loop {
            self.skip_whitespace();
            let op = match self.peek(0) {
                Some('+') => BinaryOp::Add,
                Some('-') => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            self.next_char();
            let rhs = self.parse_term()?;
            lhs = ExprNode::binary(op, lhs, rhs)?;
        }
    }

    fn parse_term(&mut self) -> Result<ExprNode, CompileError> {
        let mut lhs = self.parse_unary()?;
        loop {
            self.skip_whitespace();
            let op = match self.peek(0) {
                Some('*') => BinaryOp::Mul,
                Some('/') => BinaryOp::Div,
                _ => return Ok(lhs),
            };
            self.next_char();
            let rhs = self.parse_unary()?;
            lhs = ExprNode::binary(op, lhs, rhs)?;
        }
    }

    fn parse_unary(&mut self) -> Result<ExprNode, CompileError> {
        self.skip_whitespace();
        if self.peek(0) == Some('-') {
            self.next_char();
            let inner = self.parse_unary()?;
            return ExprNode::negate(inner);
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<ExprNode, CompileError> {
        let mut node = self.parse_primary()?;
        while self.peek(0) == Some('.') {
            self.next_char();
            let pattern = self.parse_ident()?;
            node = ExprNode::swizzle(node, &pattern)?;
        }
        Ok(node)
    }

    fn parse_primary(&mut self) -> Result<ExprNode, CompileError> {
        self.skip_whitespace();
        match self.peek(0) {
            Some('(') => {
                self.next_char();
                let node = self.parse_expr()?;
                self.expect(')')?;
                Ok(node)
            }
            Some(c) if c.is_ascii_digit() || c == '.' => self.parse_number(),
            Some(c) if c.is_alphabetic() || c == '_' => {
                let name = self.parse_ident()?;
                match name.as_str() {
                    "true" => return Ok(ExprNode::Literal(Value::bool(true))),
                    "false" => return Ok(ExprNode::Literal(Value::bool(false))),
                    _ => {}
                }
                self.skip_whitespace();
                if self.peek(0) == Some('(') {
                    self.next_char();
                    let args = self.parse_args()?;
                    let function = self
                        .library
                        .get(&name)
                        .ok_or_else(|| CompileError::UnknownFunction(name.clone()))?;
                    ExprNode::call(function, args)
                } else {
                    ExprNode::variable(&name, self.container)
                }
            }
            Some(c) => Err(self.error(format!("unexpected `{}`", c))),
            None => Err(self.error("unexpected end of input")),
        }
    }

    fn parse_args(&mut self) -> Result<Vec<ExprNode>, CompileError> {
        let mut args = vec![];
        self.skip_whitespace();
        if self.peek(0) == Some(')') {
            self.next_char();
            return Ok(args);
        }
        loop {
            args.push(self.parse_expr()?);
            self.skip_whitespace();
            match self.next_char() {
                Some(',') => continue,
                Some(')') => return Ok(args),
                Some(c) => return Err(self.error(format!("expected `,` or `)` but found `{}`", c))),
                None => return Err(self.error("unterminated argument list")),
            }
        }
    }

    fn parse_ident(&mut self) -> Result<String, CompileError> {
        let mut s = String::new();
        while let Some(c) = self.peek(0) {
            if c.is_alphanumeric() || c == '_' {
                s.push(c);
                self.next_char();
            } else {
                break;
            }
        }
        if s.is_empty() {
            return Err(self.error("expected identifier"));
        }
        Ok(s)
    }

    fn parse_number(&mut self) -> Result<ExprNode, CompileError> {
        let (line, col) = (self.line, self.col);
        let mut s = String::new();
        while let Some(c) = self.peek(0) {
            if c.is_ascii_digit() || c == '.' {
                s.push(c);
                self.next_char();
            } else if (c == 'e' || c == 'E') && !s.is_empty() {
                s.push(c);
                self.next_char();
                if let Some(sign @ ('+' | '-')) = self.peek(0) {
                    s.push(sign);
                    self.next_char();
                }
            } else {
                break;
            }
        }
        s.parse::<f32>()
            .map(|v| ExprNode::Literal(Value::float1(v)))
            .map_err(|_| CompileError::parse(format!("invalid number `{}`", s), line, col))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::expr::builtins;

    fn parse(src: &str) -> Result<ExprNode, CompileError> {
        let c = VariableContainer::new();
        Parser::new(src, &c, builtins()).parse()
    }

    #[test]
    fn numbers() {
        for (src, v) in [("3", 3.0), ("0.5", 0.5), (".25", 0.25), ("1e2", 100.0), ("2.5E-1", 0.25)] {
            match parse(src).unwrap() {
                ExprNode::Literal(l) => assert_eq!(l.try_f32().unwrap(), v, "{}", src),
                other => panic!("{:?}", other),
            }
        }
        assert!(parse("1.2.3").is_err());
    }

    #[test]
    fn booleans() {
        match parse("true").unwrap() {
            ExprNode::Literal(Value::Bool(true)) => {}
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn error_column() {
        match parse("1 + )") {
            Err(CompileError::Parse { line, col, .. }) => {
                assert_eq!(line, 1);
                assert_eq!(col, 5);
            }
            other => panic!("{:?}", other),
        }
    }
}
