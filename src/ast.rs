use std::fmt::Display;

#[derive(Debug, Clone, PartialEq)]
pub struct Program(pub Vec<Statement>);

#[derive(Debug, Clone, PartialEq)]
pub struct Block(pub Vec<Statement>);

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    pub name: String,
    pub params: Vec<String>,
    pub body: Block,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Assign(String, Expression),
    Print(Expression),
    If(Expression, Block, Option<Block>),
    While(Expression, Block),
    Function(FunctionDecl),
    Return(Expression),
    Expression(Expression),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Number(i64),
    String(String),
    Variable(String),
    Call(String, Vec<Expression>),
    Binary(Box<Expression>, InfixOperator, Box<Expression>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfixOperator {
    Add,
    Sub,
    Mult,
    Div,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

impl Expression {
    pub fn binary(left: Expression, op: InfixOperator, right: Expression) -> Expression {
        Expression::Binary(Box::new(left), op, Box::new(right))
    }

    /// Height of the tree, a lone literal being 1. Walks with an explicit
    /// worklist so arbitrarily tall trees can be measured.
    pub fn depth(&self) -> usize {
        let mut max = 0;
        let mut pending = vec![(self, 1)];
        while let Some((expr, depth)) = pending.pop() {
            max = max.max(depth);
            match expr {
                Expression::Binary(left, _, right) => {
                    pending.push((left.as_ref(), depth + 1));
                    pending.push((right.as_ref(), depth + 1));
                }
                Expression::Call(_, args) => {
                    pending.extend(args.iter().map(|arg| (arg, depth + 1)));
                }
                Expression::Number(_) | Expression::String(_) | Expression::Variable(_) => {}
            }
        }
        max
    }
}

impl Display for Program {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for statement in &self.0 {
            writeln!(f, "{}", statement)?;
        }
        Ok(())
    }
}

impl Display for Block {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{{")?;
        for statement in &self.0 {
            writeln!(f, "{}", statement)?;
        }
        write!(f, "}}")
    }
}

impl Display for Statement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Statement::Expression(expr) => write!(f, "{}", expr),
            Statement::Print(expr) => write!(f, "print({})", expr),
            Statement::Assign(name, expr) => write!(f, "{} = {}", name, expr),
            Statement::If(condition, then_branch, else_branch) => {
                write!(f, "if ({}) {}", condition, then_branch)?;
                if let Some(else_branch) = else_branch {
                    write!(f, " else {}", else_branch)?;
                }
                Ok(())
            }
            Statement::While(condition, body) => write!(f, "while ({}) {}", condition, body),
            Statement::Function(decl) => {
                write!(f, "func {}({}) {}", decl.name, decl.params.join(", "), decl.body)
            }
            Statement::Return(expr) => write!(f, "return {}", expr),
        }
    }
}

impl Display for Expression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expression::Number(n) => write!(f, "{}", n),
            Expression::String(s) => write!(f, "\"{}\"", s),
            Expression::Variable(name) => write!(f, "{}", name),
            Expression::Binary(left, op, right) => write!(f, "({} {} {})", op, left, right),
            Expression::Call(name, args) => {
                write!(f, "{}(", name)?;
                for (i, arg) in args.iter().enumerate() {
                    write!(f, "{}", arg)?;
                    if i != args.len() - 1 {
                        write!(f, ", ")?;
                    }
                }
                write!(f, ")")
            }
        }
    }
}

impl Display for InfixOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InfixOperator::Add => write!(f, "+"),
            InfixOperator::Sub => write!(f, "-"),
            InfixOperator::Mult => write!(f, "*"),
            InfixOperator::Div => write!(f, "/"),
            InfixOperator::Eq => write!(f, "=="),
            InfixOperator::Ne => write!(f, "!="),
            InfixOperator::Lt => write!(f, "<"),
            InfixOperator::Gt => write!(f, ">"),
            InfixOperator::Le => write!(f, "<="),
            InfixOperator::Ge => write!(f, ">="),
        }
    }
}
