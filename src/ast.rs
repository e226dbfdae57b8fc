/// Name given to the prototype wrapping a bare top-level expression.
pub const ANON_FN: &str = "__anon_expr";

/// A callable's name and parameter names. All values share the one numeric
/// type, so the prototype carries no type information.
#[derive(Debug, PartialEq, Clone)]
pub struct Prototype {
    pub name: String,
    pub params: Vec<String>,
}

#[derive(Debug, PartialEq, Clone)]
pub enum Expr {
    Number(f64),
    Variable(String),
    Binary(char, Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
}

#[derive(Debug, PartialEq, Clone)]
pub struct Function {
    pub prototype: Prototype,
    pub body: Expr,
}

/// One top-level unit: an external declaration or a full definition.
#[derive(Debug, PartialEq, Clone)]
pub enum Item {
    Extern(Prototype),
    Function(Function),
}
