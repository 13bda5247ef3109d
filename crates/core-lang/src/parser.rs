//! Recursive-descent parser over the lexer's token stream.
//!
//! Produces a [`crate::ast::Program`] or a [`ParseError`] carrying the
//! line, column and offending source line needed for the caret-style
//! diagnostics described for `SyntacticFailure`.

use crate::ast::*;
use crate::lexer::{LexError, Lexer, Tok, Token};

#[derive(Debug, Clone)]
pub struct ParseError {
    pub line: u32,
    pub col: u32,
    pub message: String,
    pub offending_line: String,
}

impl From<LexError> for ParseError {
    fn from(e: LexError) -> Self {
        ParseError {
            line: e.line,
            col: e.col,
            message: e.message,
            offending_line: e.offending_line,
        }
    }
}

pub struct Parser<'a> {
    src: &'a str,
    toks: Vec<Token>,
    pos: usize,
}

fn line_text(src: &str, line: u32) -> String {
    src.lines().nth((line.saturating_sub(1)) as usize).unwrap_or("").to_string()
}

pub fn parse_program(src: &str) -> Result<Program, ParseError> {
    let toks = Lexer::new(src).tokenize()?;
    let mut p = Parser { src, toks, pos: 0 };
    p.skip_newlines();
    let mut body = Vec::new();
    while !p.at(&Tok::Eof) {
        body.push(p.parse_statement()?);
        p.skip_newlines();
    }
    Ok(Program { body })
}

/// Parses a single expression, used to splice f-string `{...}` segments
/// and as an entry point for tests.
pub fn parse_expr_str(src: &str) -> Result<Expr, ParseError> {
    let toks = Lexer::new(src).tokenize()?;
    let mut p = Parser { src, toks, pos: 0 };
    let e = p.parse_expr()?;
    Ok(e)
}

impl<'a> Parser<'a> {
    fn cur(&self) -> &Tok {
        &self.toks[self.pos].tok
    }

    fn cur_line(&self) -> u32 {
        self.toks[self.pos].line
    }

    fn cur_col(&self) -> u32 {
        self.toks[self.pos].col
    }

    fn at(&self, t: &Tok) -> bool {
        self.cur() == t
    }

    fn bump(&mut self) -> Tok {
        let t = self.toks[self.pos].tok.clone();
        if self.pos + 1 < self.toks.len() {
            self.pos += 1;
        }
        t
    }

    fn err(&self, message: impl Into<String>) -> ParseError {
        ParseError {
            line: self.cur_line(),
            col: self.cur_col(),
            message: message.into(),
            offending_line: line_text(self.src, self.cur_line()),
        }
    }

    fn expect(&mut self, t: &Tok) -> Result<Tok, ParseError> {
        if self.cur() == t {
            Ok(self.bump())
        } else {
            Err(self.err(format!("expected {t}, found {}", self.cur())))
        }
    }

    fn expect_name(&mut self) -> Result<String, ParseError> {
        match self.cur().clone() {
            Tok::Name(n) => {
                self.bump();
                Ok(n)
            }
            other => Err(self.err(format!("expected identifier, found {other}"))),
        }
    }

    fn skip_newlines(&mut self) {
        while self.at(&Tok::Newline) {
            self.bump();
        }
    }

    fn parse_block(&mut self) -> Result<Vec<Stmt>, ParseError> {
        self.expect(&Tok::Colon)?;
        self.skip_newlines();
        if self.at(&Tok::Indent) {
            self.bump();
            let mut body = Vec::new();
            while !self.at(&Tok::Dedent) && !self.at(&Tok::Eof) {
                body.push(self.parse_statement()?);
                self.skip_newlines();
            }
            if self.at(&Tok::Dedent) {
                self.bump();
            }
            Ok(body)
        } else {
            // single-line block: `if x: return y`
            let stmt = self.parse_simple_statement()?;
            self.skip_newlines();
            Ok(vec![stmt])
        }
    }

    fn parse_statement(&mut self) -> Result<Stmt, ParseError> {
        match self.cur() {
            Tok::Def => self.parse_function_def().map(Stmt::FunctionDef),
            Tok::Class => self.parse_class_def().map(Stmt::ClassDef),
            Tok::If => self.parse_if(),
            Tok::While => self.parse_while(),
            Tok::For => self.parse_for(),
            Tok::Try => self.parse_try(),
            _ => self.parse_simple_statement(),
        }
    }

    fn parse_simple_statement(&mut self) -> Result<Stmt, ParseError> {
        let stmt = match self.cur().clone() {
            Tok::Return => {
                self.bump();
                if self.at(&Tok::Newline) || self.at(&Tok::Eof) {
                    Stmt::Return(None)
                } else {
                    Stmt::Return(Some(self.parse_expr()?))
                }
            }
            Tok::Break => {
                self.bump();
                Stmt::Break
            }
            Tok::Continue => {
                self.bump();
                Stmt::Continue
            }
            Tok::Pass => {
                self.bump();
                Stmt::Pass
            }
            Tok::Raise => {
                self.bump();
                if self.at(&Tok::Newline) || self.at(&Tok::Eof) {
                    Stmt::Raise(None)
                } else {
                    Stmt::Raise(Some(self.parse_expr()?))
                }
            }
            Tok::Import => {
                self.bump();
                let module = self.expect_name()?;
                let alias = if matches!(self.cur(), Tok::Name(n) if n == "as") {
                    self.bump();
                    Some(self.expect_name()?)
                } else {
                    None
                };
                Stmt::Import { module, alias }
            }
            _ => self.parse_expr_or_assign()?,
        };
        if !self.at(&Tok::Eof) {
            self.expect(&Tok::Newline)?;
        }
        Ok(stmt)
    }

    fn parse_expr_or_assign(&mut self) -> Result<Stmt, ParseError> {
        let first = self.parse_expr()?;
        if let Some(op) = self.aug_assign_op() {
            self.bump();
            let value = self.parse_expr()?;
            let target = expr_to_target(first, |e| self.err_owned(e))?;
            return Ok(Stmt::AugAssign { target, op, value });
        }
        if self.at(&Tok::Eq) {
            self.bump();
            let value = self.parse_expr()?;
            let target = expr_to_target(first, |e| self.err_owned(e))?;
            return Ok(Stmt::Assign { target, value });
        }
        Ok(Stmt::Expr(first))
    }

    fn err_owned(&self, message: String) -> ParseError {
        self.err(message)
    }

    fn aug_assign_op(&self) -> Option<BinOp> {
        match self.cur() {
            Tok::PlusEq => Some(BinOp::Add),
            Tok::MinusEq => Some(BinOp::Sub),
            Tok::StarEq => Some(BinOp::Mul),
            Tok::SlashEq => Some(BinOp::Div),
            Tok::PercentEq => Some(BinOp::Mod),
            _ => None,
        }
    }

    fn parse_if(&mut self) -> Result<Stmt, ParseError> {
        self.expect(&Tok::If)?;
        let cond = self.parse_expr()?;
        let body = self.parse_block()?;
        let mut branches = vec![(cond, body)];
        let mut orelse = Vec::new();
        loop {
            match self.cur() {
                Tok::Elif => {
                    self.bump();
                    let c = self.parse_expr()?;
                    let b = self.parse_block()?;
                    branches.push((c, b));
                }
                Tok::Else => {
                    self.bump();
                    orelse = self.parse_block()?;
                    break;
                }
                _ => break,
            }
        }
        Ok(Stmt::If { branches, orelse })
    }

    fn parse_while(&mut self) -> Result<Stmt, ParseError> {
        self.expect(&Tok::While)?;
        let cond = self.parse_expr()?;
        let body = self.parse_block()?;
        Ok(Stmt::While { cond, body })
    }

    fn parse_for(&mut self) -> Result<Stmt, ParseError> {
        self.expect(&Tok::For)?;
        let var = self.expect_name()?;
        self.expect(&Tok::In)?;
        let iter = self.parse_expr()?;
        let body = self.parse_block()?;
        Ok(Stmt::For { var, iter, body })
    }

    fn parse_try(&mut self) -> Result<Stmt, ParseError> {
        self.expect(&Tok::Try)?;
        let body = self.parse_block()?;
        let mut handlers = Vec::new();
        while self.at(&Tok::Except) {
            self.bump();
            let mut exc_type = None;
            let mut binding = None;
            if !self.at(&Tok::Colon) {
                exc_type = Some(self.expect_name()?);
                if matches!(self.cur(), Tok::Name(n) if n == "as") {
                    self.bump();
                    binding = Some(self.expect_name()?);
                }
            }
            let hbody = self.parse_block()?;
            handlers.push(ExceptHandler {
                exc_type,
                binding,
                body: hbody,
            });
        }
        let finally = if self.at(&Tok::Finally) {
            self.bump();
            self.parse_block()?
        } else {
            Vec::new()
        };
        Ok(Stmt::Try {
            body,
            handlers,
            finally,
        })
    }

    fn parse_function_def(&mut self) -> Result<FunctionDef, ParseError> {
        let line = self.cur_line();
        self.expect(&Tok::Def)?;
        let name = self.expect_name()?;
        self.expect(&Tok::LParen)?;
        let mut params = Vec::new();
        while !self.at(&Tok::RParen) {
            let pname = self.expect_name()?;
            let default = if self.at(&Tok::Eq) {
                self.bump();
                Some(self.parse_expr()?)
            } else {
                None
            };
            params.push(Param { name: pname, default });
            if self.at(&Tok::Comma) {
                self.bump();
            } else {
                break;
            }
        }
        self.expect(&Tok::RParen)?;
        let body = self.parse_block()?;
        Ok(FunctionDef { name, params, body, line })
    }

    fn parse_class_def(&mut self) -> Result<ClassDef, ParseError> {
        let line = self.cur_line();
        self.expect(&Tok::Class)?;
        let name = self.expect_name()?;
        let mut base = None;
        if self.at(&Tok::LParen) {
            self.bump();
            if !self.at(&Tok::RParen) {
                base = Some(self.expect_name()?);
            }
            self.expect(&Tok::RParen)?;
        }
        self.expect(&Tok::Colon)?;
        self.skip_newlines();
        self.expect(&Tok::Indent)?;
        let mut methods = Vec::new();
        while !self.at(&Tok::Dedent) && !self.at(&Tok::Eof) {
            if self.at(&Tok::Pass) {
                self.bump();
                self.skip_newlines();
                continue;
            }
            methods.push(self.parse_function_def()?);
            self.skip_newlines();
        }
        if self.at(&Tok::Dedent) {
            self.bump();
        }
        Ok(ClassDef {
            name,
            base,
            methods,
            line,
        })
    }

    // --- expressions, lowest to highest precedence ---

    fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_and()?;
        while self.at(&Tok::Or) {
            self.bump();
            let right = self.parse_and()?;
            left = Expr::BoolOp(BoolOp::Or, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_not()?;
        while self.at(&Tok::And) {
            self.bump();
            let right = self.parse_not()?;
            left = Expr::BoolOp(BoolOp::And, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr, ParseError> {
        if self.at(&Tok::Not) {
            self.bump();
            let inner = self.parse_not()?;
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(inner)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, ParseError> {
        let left = self.parse_arith()?;
        let mut rest = Vec::new();
        loop {
            let op = match self.cur() {
                Tok::EqEq => CmpOp::Eq,
                Tok::NotEq => CmpOp::NotEq,
                Tok::Lt => CmpOp::Lt,
                Tok::LtEq => CmpOp::LtEq,
                Tok::Gt => CmpOp::Gt,
                Tok::GtEq => CmpOp::GtEq,
                Tok::Is => {
                    self.bump();
                    if self.at(&Tok::Not) {
                        self.bump();
                        rest.push((CmpOp::IsNot, self.parse_arith()?));
                    } else {
                        rest.push((CmpOp::Is, self.parse_arith()?));
                    }
                    continue;
                }
                Tok::In => {
                    self.bump();
                    rest.push((CmpOp::In, self.parse_arith()?));
                    continue;
                }
                Tok::Not => {
                    // `not in`
                    let save = self.pos;
                    self.bump();
                    if self.at(&Tok::In) {
                        self.bump();
                        rest.push((CmpOp::NotIn, self.parse_arith()?));
                        continue;
                    }
                    self.pos = save;
                    break;
                }
                _ => break,
            };
            self.bump();
            rest.push((op, self.parse_arith()?));
        }
        if rest.is_empty() {
            Ok(left)
        } else {
            Ok(Expr::Compare(Box::new(left), rest))
        }
    }

    fn parse_arith(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_term()?;
        loop {
            let op = match self.cur() {
                Tok::Plus => BinOp::Add,
                Tok::Minus => BinOp::Sub,
                _ => break,
            };
            self.bump();
            let right = self.parse_term()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.cur() {
                Tok::Star => BinOp::Mul,
                Tok::Slash => BinOp::Div,
                Tok::DoubleSlash => BinOp::FloorDiv,
                Tok::Percent => BinOp::Mod,
                _ => break,
            };
            self.bump();
            let right = self.parse_unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        if self.at(&Tok::Minus) {
            self.bump();
            let inner = self.parse_unary()?;
            return Ok(Expr::Unary(UnaryOp::Neg, Box::new(inner)));
        }
        self.parse_power()
    }

    fn parse_power(&mut self) -> Result<Expr, ParseError> {
        let base = self.parse_postfix()?;
        if self.at(&Tok::DoubleStar) {
            self.bump();
            let exp = self.parse_unary()?;
            return Ok(Expr::Binary(BinOp::Pow, Box::new(base), Box::new(exp)));
        }
        Ok(base)
    }

    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_atom()?;
        loop {
            match self.cur() {
                Tok::LParen => {
                    self.bump();
                    let (args, kwargs) = self.parse_call_args()?;
                    self.expect(&Tok::RParen)?;
                    expr = Expr::Call {
                        func: Box::new(expr),
                        args,
                        kwargs,
                    };
                }
                Tok::Dot => {
                    self.bump();
                    let name = self.expect_name()?;
                    expr = Expr::Attribute {
                        target: Box::new(expr),
                        name,
                    };
                }
                Tok::LBracket => {
                    self.bump();
                    expr = self.parse_index_or_slice(expr)?;
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_call_args(&mut self) -> Result<(Vec<Expr>, Vec<(String, Expr)>), ParseError> {
        let mut args = Vec::new();
        let mut kwargs = Vec::new();
        while !self.at(&Tok::RParen) {
            if let Tok::Name(n) = self.cur().clone() {
                let save = self.pos;
                self.bump();
                if self.at(&Tok::Eq) {
                    self.bump();
                    let v = self.parse_expr()?;
                    kwargs.push((n, v));
                    if self.at(&Tok::Comma) {
                        self.bump();
                        continue;
                    } else {
                        break;
                    }
                } else {
                    self.pos = save;
                }
            }
            args.push(self.parse_expr()?);
            if self.at(&Tok::Comma) {
                self.bump();
            } else {
                break;
            }
        }
        Ok((args, kwargs))
    }

    fn parse_index_or_slice(&mut self, target: Expr) -> Result<Expr, ParseError> {
        let start = if self.at(&Tok::Colon) {
            None
        } else {
            Some(Box::new(self.parse_expr()?))
        };
        if self.at(&Tok::Colon) {
            self.bump();
            let stop = if self.at(&Tok::Colon) || self.at(&Tok::RBracket) {
                None
            } else {
                Some(Box::new(self.parse_expr()?))
            };
            let step = if self.at(&Tok::Colon) {
                self.bump();
                if self.at(&Tok::RBracket) {
                    None
                } else {
                    Some(Box::new(self.parse_expr()?))
                }
            } else {
                None
            };
            self.expect(&Tok::RBracket)?;
            Ok(Expr::Slice {
                target: Box::new(target),
                start,
                stop,
                step,
            })
        } else {
            let index = start.ok_or_else(|| self.err("empty index expression"))?;
            self.expect(&Tok::RBracket)?;
            Ok(Expr::Index {
                target: Box::new(target),
                index,
            })
        }
    }

    fn parse_atom(&mut self) -> Result<Expr, ParseError> {
        match self.cur().clone() {
            Tok::Int(v) => {
                self.bump();
                Ok(Expr::Literal(Literal::Int(v)))
            }
            Tok::Float(v) => {
                self.bump();
                Ok(Expr::Literal(Literal::Float(v)))
            }
            Tok::Str(s) => {
                self.bump();
                Ok(Expr::Literal(Literal::Str(s)))
            }
            Tok::FStr(raw) => {
                let line = self.cur_line();
                self.bump();
                Ok(Expr::FString(parse_fstring_parts(&raw, line)?))
            }
            Tok::True_ => {
                self.bump();
                Ok(Expr::Literal(Literal::Bool(true)))
            }
            Tok::False_ => {
                self.bump();
                Ok(Expr::Literal(Literal::Bool(false)))
            }
            Tok::None_ => {
                self.bump();
                Ok(Expr::Literal(Literal::None))
            }
            Tok::Name(n) => {
                self.bump();
                Ok(Expr::Name(n))
            }
            Tok::LParen => {
                self.bump();
                if self.at(&Tok::RParen) {
                    self.bump();
                    return Ok(Expr::Tuple(Vec::new()));
                }
                let first = self.parse_expr()?;
                if self.at(&Tok::Comma) {
                    let mut items = vec![first];
                    while self.at(&Tok::Comma) {
                        self.bump();
                        if self.at(&Tok::RParen) {
                            break;
                        }
                        items.push(self.parse_expr()?);
                    }
                    self.expect(&Tok::RParen)?;
                    Ok(Expr::Tuple(items))
                } else {
                    self.expect(&Tok::RParen)?;
                    Ok(first)
                }
            }
            Tok::LBracket => {
                self.bump();
                if self.at(&Tok::RBracket) {
                    self.bump();
                    return Ok(Expr::List(Vec::new()));
                }
                let first = self.parse_expr()?;
                if matches!(self.cur(), Tok::Name(n) if n == "for") {
                    self.bump();
                    let var = self.expect_name()?;
                    self.expect(&Tok::In)?;
                    let iter = self.parse_expr()?;
                    let cond = if self.at(&Tok::If) {
                        self.bump();
                        Some(Box::new(self.parse_expr()?))
                    } else {
                        None
                    };
                    self.expect(&Tok::RBracket)?;
                    return Ok(Expr::ListComp {
                        element: Box::new(first),
                        var,
                        iter: Box::new(iter),
                        cond,
                    });
                }
                let mut items = vec![first];
                while self.at(&Tok::Comma) {
                    self.bump();
                    if self.at(&Tok::RBracket) {
                        break;
                    }
                    items.push(self.parse_expr()?);
                }
                self.expect(&Tok::RBracket)?;
                Ok(Expr::List(items))
            }
            Tok::LBrace => {
                self.bump();
                let mut items = Vec::new();
                while !self.at(&Tok::RBrace) {
                    let k = self.parse_expr()?;
                    self.expect(&Tok::Colon)?;
                    let v = self.parse_expr()?;
                    items.push((k, v));
                    if self.at(&Tok::Comma) {
                        self.bump();
                    } else {
                        break;
                    }
                }
                self.expect(&Tok::RBrace)?;
                Ok(Expr::Dict(items))
            }
            other => Err(self.err(format!("unexpected token {other} in expression"))),
        }
    }
}

/// `for`/`in` appear both as keywords in comprehensions and as the literal
/// identifier `"for"` nowhere else in this grammar, so the atom parser
/// checks for the `Name("for")` spelling directly rather than adding a
/// dedicated token — the lexer never special-cased it as a keyword.
fn parse_fstring_parts(raw: &str, line: u32) -> Result<Vec<FStringPart>, ParseError> {
    let mut parts = Vec::new();
    let mut literal = String::new();
    let chars: Vec<char> = raw.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '{' if chars.get(i + 1) == Some(&'{') => {
                literal.push('{');
                i += 2;
            }
            '}' if chars.get(i + 1) == Some(&'}') => {
                literal.push('}');
                i += 2;
            }
            '{' => {
                if !literal.is_empty() {
                    parts.push(FStringPart::Literal(std::mem::take(&mut literal)));
                }
                i += 1;
                let start = i;
                let mut depth = 1;
                while i < chars.len() && depth > 0 {
                    match chars[i] {
                        '{' => depth += 1,
                        '}' => depth -= 1,
                        _ => {}
                    }
                    if depth > 0 {
                        i += 1;
                    }
                }
                let inner: String = chars[start..i].iter().collect();
                i += 1; // skip closing brace
                let expr = parse_expr_str(&inner).map_err(|mut e| {
                    e.line = line;
                    e
                })?;
                parts.push(FStringPart::Expr(Box::new(expr)));
            }
            c => {
                literal.push(c);
                i += 1;
            }
        }
    }
    if !literal.is_empty() || parts.is_empty() {
        parts.push(FStringPart::Literal(literal));
    }
    Ok(parts)
}

fn expr_to_target(e: Expr, err: impl Fn(String) -> ParseError) -> Result<AssignTarget, ParseError> {
    match e {
        Expr::Name(n) => Ok(AssignTarget::Name(n)),
        Expr::Index { target, index } => Ok(AssignTarget::Index { target, index }),
        Expr::Attribute { target, name } => Ok(AssignTarget::Attribute { target, name }),
        Expr::Tuple(items) => {
            let targets = items
                .into_iter()
                .map(|i| expr_to_target(i, &err))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(AssignTarget::Tuple(targets))
        }
        other => Err(err(format!("cannot assign to {:?}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_assignment_and_expr() {
        let prog = parse_program("x = 1 + 2\n").unwrap();
        assert_eq!(prog.body.len(), 1);
        assert!(matches!(prog.body[0], Stmt::Assign { .. }));
    }

    #[test]
    fn parses_function_with_default_and_recursion() {
        let src = "def kare_al(n):\n    return n * n\n";
        let prog = parse_program(src).unwrap();
        match &prog.body[0] {
            Stmt::FunctionDef(f) => {
                assert_eq!(f.name, "kare_al");
                assert_eq!(f.params.len(), 1);
            }
            _ => panic!("expected function def"),
        }
    }

    #[test]
    fn parses_class_with_base_and_methods() {
        let src = "class Kedi(Hayvan):\n    def __init__(self, isim):\n        self.isim = isim\n";
        let prog = parse_program(src).unwrap();
        match &prog.body[0] {
            Stmt::ClassDef(c) => {
                assert_eq!(c.name, "Kedi");
                assert_eq!(c.base.as_deref(), Some("Hayvan"));
                assert_eq!(c.methods.len(), 1);
            }
            _ => panic!("expected class def"),
        }
    }

    #[test]
    fn parses_list_comprehension() {
        let src = "kareler = [x * x for x in range(1, 11)]\n";
        let prog = parse_program(src).unwrap();
        match &prog.body[0] {
            Stmt::Assign { value: Expr::ListComp { .. }, .. } => {}
            other => panic!("expected list comp assignment, got {other:?}"),
        }
    }

    #[test]
    fn parses_try_except() {
        let src = "try:\n    x = 1 / 0\nexcept ZeroDivisionError as e:\n    x = 0\n";
        let prog = parse_program(src).unwrap();
        assert!(matches!(prog.body[0], Stmt::Try { .. }));
    }

    #[test]
    fn parses_fstring_with_embedded_expr() {
        let src = "x = f\"value: {1 + 2}\"\n";
        let prog = parse_program(src).unwrap();
        match &prog.body[0] {
            Stmt::Assign { value: Expr::FString(parts), .. } => {
                assert_eq!(parts.len(), 2);
            }
            other => panic!("expected fstring assignment, got {other:?}"),
        }
    }

    #[test]
    fn reports_line_number_on_syntax_error() {
        let src = "x = 1\ny = (\n";
        let err = parse_program(src).unwrap_err();
        assert_eq!(err.line, 3);
    }

    #[test]
    fn parses_percent_equals_as_modulo_aug_assign() {
        let src = "x %= 3\n";
        let prog = parse_program(src).unwrap();
        match &prog.body[0] {
            Stmt::AugAssign { op, .. } => assert_eq!(*op, BinOp::Mod),
            other => panic!("expected aug-assign, got {other:?}"),
        }
    }
}
