use std::collections::{hash_map::Entry, HashMap};

use tracing::{debug, trace};

use crate::{
    ast::{BinaryOperator, Expr, ExprKind, Function, Ident, Program, Stmt, StmtKind},
    ir::{Instruction, Operand, Section, ENTRY_POINT, SLOT_SIZE},
    token::{Span, Spanned},
};

type Result<T, E = Spanned<Error>> = std::result::Result<T, E>;

/// Deepest nesting of operations in right operand position. Chains that only
/// grow to the left, as left folding produces, are not limited.
pub const MAX_EXPR_DEPTH: usize = 256;

/// Lowers the program into a flat instruction listing.
///
/// Functions are hoisted: every function, wherever it is declared, is emitted
/// before the entry point and may be called from anywhere.
pub fn lower(program: &Program) -> Result<Vec<Instruction>> {
    let mut lowerer = Lowerer::default();
    lowerer.collect(&program.statements)?;
    lowerer.lower_program(program)
}

/// Size in bytes of a frame holding `slots` values. The word at offset zero
/// is never used, so slot `i` lives at `(i + 1) * 8`.
pub fn frame_size(slots: usize) -> u32 {
    let words = u32::try_from(slots).map_or(u32::MAX, |slots| slots.saturating_add(1));
    crate::codegen::interface::stack_alignment(words.saturating_mul(SLOT_SIZE))
}

#[derive(Default)]
struct Lowerer<'ast> {
    /// Arity of every declared function.
    functions: HashMap<&'ast str, usize>,
    /// Functions in declaration order, nested ones included.
    hoisted: Vec<&'ast Function>,
    literals: Vec<Box<str>>,
    /// Literal index of each `print` statement, keyed by its address.
    print_indices: HashMap<*const Stmt, usize>,
    out: Vec<Instruction>,
    scope: Scope<'ast>,
    enclosing: Vec<Scope<'ast>>,
    next_temp: u32,
    in_function: bool,
}

#[derive(Default)]
struct Scope<'ast> {
    names: Vec<&'ast str>,
    temps: u32,
}

impl Scope<'_> {
    fn slots(&self) -> usize {
        self.names.len() + self.temps as usize
    }
}

/// Declaration pass.
impl<'ast> Lowerer<'ast> {
    fn collect(&mut self, statements: &'ast [Stmt]) -> Result<()> {
        for stmt in statements {
            match &stmt.kind {
                StmtKind::Function(function) => {
                    self.declare_function(function)?;
                    self.collect(&function.body.statements)?;
                }
                StmtKind::Block(block) => self.collect(&block.statements)?,
                StmtKind::Print { message } => {
                    let value = evaluate(message)?;
                    self.print_indices
                        .insert(std::ptr::from_ref(stmt), self.literals.len());
                    self.literals.push(value.to_string().into_boxed_str());
                }
                StmtKind::Let { .. }
                | StmtKind::Exit { .. }
                | StmtKind::Call { .. }
                | StmtKind::Return { .. } => {}
            }
        }
        Ok(())
    }

    fn declare_function(&mut self, function: &'ast Function) -> Result<()> {
        let Ident { name, span } = &function.name;
        if is_data_label(name) {
            return Err(span.wrap(Error::ReservedLabel(name.clone())));
        }
        let mut params: Vec<&str> = Vec::with_capacity(function.params.len());
        for param in &function.params {
            if params.contains(&&*param.name) {
                return Err(param.span.wrap(Error::DuplicateParameter(param.name.clone())));
            }
            params.push(&param.name);
        }
        match self.functions.entry(name) {
            Entry::Occupied(_) => Err(span.wrap(Error::DuplicateFunction(name.clone()))),
            Entry::Vacant(entry) => {
                entry.insert(function.params.len());
                self.hoisted.push(function);
                Ok(())
            }
        }
    }
}

/// Emission pass.
impl<'ast> Lowerer<'ast> {
    fn lower_program(mut self, program: &'ast Program) -> Result<Vec<Instruction>> {
        self.out.push(Instruction::Global(ENTRY_POINT.into()));
        if !self.literals.is_empty() {
            self.out.push(Instruction::Section(Section::Data));
            let literals = std::mem::take(&mut self.literals);
            for (index, text) in literals.into_iter().enumerate() {
                self.out.push(Instruction::Literal { index, text });
            }
        }
        self.out.push(Instruction::Section(Section::Text));

        for function in std::mem::take(&mut self.hoisted) {
            self.lower_function(function)?;
        }

        self.out.push(Instruction::Label(ENTRY_POINT.into()));
        self.in_function = false;
        self.next_temp = 0;
        self.lower_frame(&[], &program.statements)?;

        debug!(
            instructions = self.out.len(),
            functions = self.functions.len(),
            literals = self.print_indices.len(),
            "lowered program"
        );
        Ok(self.out)
    }

    fn lower_function(&mut self, function: &'ast Function) -> Result<()> {
        trace!(name = %function.name, params = function.params.len(), "lowering function");
        self.out.push(Instruction::Label(function.name.name.clone()));
        self.in_function = true;
        self.next_temp = 0;
        self.lower_frame(&function.params, &function.body.statements)?;
        self.out.push(Instruction::Ret);
        Ok(())
    }

    /// Lowers the statements of a new scope, wrapping them in a frame when the
    /// scope declares anything.
    fn lower_frame(&mut self, params: &'ast [Ident], statements: &'ast [Stmt]) -> Result<()> {
        let start = self.out.len();
        let outer = std::mem::take(&mut self.scope);
        self.enclosing.push(outer);

        for (i, param) in params.iter().enumerate() {
            self.scope.names.push(&param.name);
            self.out.push(Instruction::Parameter {
                index: i + 1,
                size: SLOT_SIZE,
                name: param.name.clone(),
            });
        }
        for stmt in statements {
            self.lower_stmt(stmt)?;
        }

        let outer = self.enclosing.pop().unwrap_or_default();
        let scope = std::mem::replace(&mut self.scope, outer);
        let slots = scope.slots();
        if slots > 0 {
            let bytes = frame_size(slots);
            self.out.insert(start, Instruction::Prolog(bytes));
            self.out.push(Instruction::Epilog(bytes));
        }
        Ok(())
    }

    fn lower_stmt(&mut self, stmt: &'ast Stmt) -> Result<()> {
        trace!(span = %stmt.span, "lowering statement");
        match &stmt.kind {
            StmtKind::Let { name, value } => {
                let src = self.lower_expr(value)?;
                if !self.scope.names.contains(&&*name.name) {
                    self.scope.names.push(&name.name);
                }
                self.out.push(Instruction::Copy {
                    dst: name.name.clone(),
                    src,
                });
            }
            StmtKind::Exit { status } => {
                let status = self.lower_expr(status)?;
                self.out.push(Instruction::Exit(status));
            }
            StmtKind::Print { .. } => {
                let Some(&index) = self.print_indices.get(&std::ptr::from_ref(stmt)) else {
                    return Err(stmt.span.wrap(Error::UnnumberedPrint));
                };
                self.out.push(Instruction::Print(index));
            }
            StmtKind::Function(_) => {}
            StmtKind::Call { callee, args } => {
                let Some(&arity) = self.functions.get(&*callee.name) else {
                    let name = callee.name.clone();
                    return Err(callee.span.wrap(Error::UndefinedFunction(name)));
                };
                if arity != args.len() {
                    return Err(stmt.span.wrap(Error::ArityMismatch {
                        name: callee.name.clone(),
                        expected: arity,
                        found: args.len(),
                    }));
                }
                let values = args
                    .iter()
                    .map(|arg| self.lower_expr(arg))
                    .collect::<Result<Vec<_>>>()?;
                for (i, value) in values.into_iter().enumerate() {
                    self.out
                        .push(Instruction::StoreParameter { index: i + 1, value });
                }
                self.out.push(Instruction::Call(callee.name.clone()));
            }
            StmtKind::Return { value } => {
                if !self.in_function {
                    return Err(stmt.span.wrap(Error::ReturnOutsideFunction));
                }
                let value = self.lower_expr(value)?;
                self.out.push(Instruction::Return(value));
            }
            StmtKind::Block(block) => self.lower_frame(&[], &block.statements)?,
        }
        Ok(())
    }

    fn lower_expr(&mut self, expr: &Expr) -> Result<Operand> {
        self.lower_expr_at(expr, 0)
    }

    /// Walks the left spine iteratively, so only right operands that are
    /// themselves operations add to `depth`.
    fn lower_expr_at(&mut self, expr: &Expr, depth: usize) -> Result<Operand> {
        if depth > MAX_EXPR_DEPTH {
            return Err(expr.span.wrap(Error::ExpressionTooDeep { max: MAX_EXPR_DEPTH }));
        }
        let (leftmost, spine) = left_spine(expr);
        let mut acc = self.lower_operand(leftmost, depth)?;
        for (op, rhs, span) in spine.into_iter().rev() {
            let rhs = self.lower_operand(rhs, depth + 1)?;
            acc = self.lower_binary(op, acc, rhs, span)?;
        }
        Ok(acc)
    }

    fn lower_operand(&mut self, expr: &Expr, depth: usize) -> Result<Operand> {
        match &expr.kind {
            ExprKind::Int(int) => Ok(Operand::Int(*int)),
            ExprKind::Id(ident) => {
                if self.is_declared(&ident.name) {
                    Ok(Operand::Var(ident.name.clone()))
                } else {
                    Err(ident.span.wrap(Error::UndefinedVariable(ident.name.clone())))
                }
            }
            ExprKind::Binary { .. } => self.lower_expr_at(expr, depth),
        }
    }

    /// Folds two constants, or emits the operation into a fresh temporary.
    fn lower_binary(
        &mut self,
        op: BinaryOperator,
        lhs: Operand,
        rhs: Operand,
        span: Span,
    ) -> Result<Operand> {
        if let (Operand::Int(lhs), Operand::Int(rhs)) = (&lhs, &rhs) {
            return fold(op, *lhs, *rhs)
                .map(Operand::Int)
                .map_err(|error| span.wrap(error));
        }
        let dst = self.fresh_temp();
        self.out.push(Instruction::Binary { op, lhs, rhs, dst });
        Ok(Operand::Temp(dst))
    }

    fn fresh_temp(&mut self) -> u32 {
        let temp = self.next_temp;
        self.next_temp += 1;
        self.scope.temps += 1;
        temp
    }

    fn is_declared(&self, name: &str) -> bool {
        let declared_in = |scope: &Scope| scope.names.iter().any(|n| *n == name);
        declared_in(&self.scope) || self.enclosing.iter().any(declared_in)
    }
}

/// Evaluates an expression made only of literals.
fn evaluate(expr: &Expr) -> Result<i64> {
    evaluate_at(expr, 0)
}

fn evaluate_at(expr: &Expr, depth: usize) -> Result<i64> {
    if depth > MAX_EXPR_DEPTH {
        return Err(expr.span.wrap(Error::ExpressionTooDeep { max: MAX_EXPR_DEPTH }));
    }
    let (leftmost, spine) = left_spine(expr);
    let mut acc = evaluate_operand(leftmost, depth)?;
    for (op, rhs, span) in spine.into_iter().rev() {
        let rhs = evaluate_operand(rhs, depth + 1)?;
        acc = fold(op, acc, rhs).map_err(|error| span.wrap(error))?;
    }
    Ok(acc)
}

fn evaluate_operand(expr: &Expr, depth: usize) -> Result<i64> {
    match &expr.kind {
        ExprKind::Int(int) => Ok(*int),
        ExprKind::Id(_) => Err(expr.span.wrap(Error::NonConstantPrint)),
        ExprKind::Binary { .. } => evaluate_at(expr, depth),
    }
}

/// Splits `expr` into its leftmost operand and the operations applied to
/// it, outermost first.
fn left_spine(mut expr: &Expr) -> (&Expr, Vec<(BinaryOperator, &Expr, Span)>) {
    let mut spine = Vec::new();
    while let ExprKind::Binary { op, lhs, rhs } = &expr.kind {
        spine.push((*op, &**rhs, expr.span));
        expr = &**lhs;
    }
    (expr, spine)
}

fn fold(op: BinaryOperator, lhs: i64, rhs: i64) -> Result<i64, Error> {
    op.fold(lhs, rhs).ok_or(match op {
        BinaryOperator::Div if rhs == 0 => Error::DivisionByZero,
        BinaryOperator::Pow if rhs < 0 => Error::NegativeExponent,
        _ => Error::ConstantOverflow,
    })
}

/// Whether `name` collides with the `p<N>` and `p<N>_len` symbols of print
/// literals.
fn is_data_label(name: &str) -> bool {
    let Some(rest) = name.strip_prefix('p') else {
        return false;
    };
    let digits = rest.strip_suffix("_len").unwrap_or(rest);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("undefined variable `{0}`")]
    UndefinedVariable(Box<str>),
    #[error("undefined function `{0}`")]
    UndefinedFunction(Box<str>),
    #[error("function `{name}` takes {expected} argument(s), but {found} were given")]
    ArityMismatch {
        name: Box<str>,
        expected: usize,
        found: usize,
    },
    #[error("function `{0}` is already defined")]
    DuplicateFunction(Box<str>),
    #[error("parameter `{0}` is declared twice")]
    DuplicateParameter(Box<str>),
    #[error("function name `{0}` is reserved for print literals")]
    ReservedLabel(Box<str>),
    #[error("`return` outside of a function")]
    ReturnOutsideFunction,
    #[error("`print` requires a constant expression")]
    NonConstantPrint,
    #[error("`print` was not seen by the declaration pass")]
    UnnumberedPrint,
    #[error("constant expression overflows")]
    ConstantOverflow,
    #[error("division by zero in constant expression")]
    DivisionByZero,
    #[error("negative exponent in constant expression")]
    NegativeExponent,
    #[error("expression nests deeper than {max} levels")]
    ExpressionTooDeep { max: usize },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::test_utils::tree_tests;

    #[test]
    fn test_frame_size() {
        assert_eq!(frame_size(0), 16);
        assert_eq!(frame_size(1), 16);
        assert_eq!(frame_size(2), 32);
        assert_eq!(frame_size(3), 32);
        assert_eq!(frame_size(4), 48);
    }

    #[test]
    fn test_fold_errors() {
        assert_eq!(fold(BinaryOperator::Div, 1, 0), Err(Error::DivisionByZero));
        assert_eq!(fold(BinaryOperator::Pow, 2, -1), Err(Error::NegativeExponent));
        assert_eq!(fold(BinaryOperator::Add, i64::MAX, 1), Err(Error::ConstantOverflow));
        assert_eq!(fold(BinaryOperator::Div, i64::MIN, -1), Err(Error::ConstantOverflow));
        assert_eq!(fold(BinaryOperator::Pow, 3, 3), Ok(27));
    }

    fn chain(first: &str, op: &str, len: usize) -> String {
        let mut src = String::from(first);
        for _ in 0..len {
            src += op;
        }
        src
    }

    #[test]
    fn test_long_left_chain() {
        let src = format!("let x = 1; exit({});", chain("x", " + 1", 3_000));
        let program = crate::parser::parse(&src).unwrap();
        let listing = lower(&program).unwrap();
        assert_eq!(listing.last(), Some(&Instruction::Epilog(frame_size(3_001))));
        assert!(listing.contains(&Instruction::Exit(Operand::Temp(2_999))));
    }

    #[test]
    fn test_long_constant_chain_in_print() {
        let src = format!("print({});", chain("1", " + 1", 3_000));
        let program = crate::parser::parse(&src).unwrap();
        let listing = lower(&program).unwrap();
        assert!(listing.contains(&Instruction::Literal {
            index: 0,
            text: "3001".into(),
        }));
    }

    #[test]
    fn test_deep_right_nesting_is_rejected() {
        use crate::parser::{parse_with, ExprParsing};

        let src = format!("let x = 1; exit({});", chain("x", " ^ x", 300));
        let program = parse_with(&src, ExprParsing::Precedence).unwrap();
        let error = lower(&program).unwrap_err();
        assert_eq!(error.inner, Error::ExpressionTooDeep { max: MAX_EXPR_DEPTH });

        let src = format!("print({});", chain("1", " ^ 1", 300));
        let program = parse_with(&src, ExprParsing::Precedence).unwrap();
        let error = lower(&program).unwrap_err();
        assert_eq!(error.inner, Error::ExpressionTooDeep { max: MAX_EXPR_DEPTH });
    }

    #[test]
    fn test_data_labels() {
        assert!(is_data_label("p0"));
        assert!(is_data_label("p12"));
        assert!(is_data_label("p3_len"));
        assert!(!is_data_label("p_len"));
        assert!(!is_data_label("p"));
        assert!(!is_data_label("print2"));
        assert!(!is_data_label("q0"));
    }

    tree_tests!(
        use lower;

        fn test_empty_program() {
            let program = "";
            let tree_ok = "
                global          _start
                section         text
                label           _start
            ";
        }

        fn test_constant_exit_is_folded() {
            let program = "exit(1 + 2 + 3);";
            let tree_ok = "
                global          _start
                section         text
                label           _start
                exit            6
            ";
        }

        fn test_let_opens_frame() {
            let program = "let x = 42; exit(x);";
            let tree_ok = "
                global          _start
                section         text
                label           _start
                prolog          16
                =               x, 42
                exit            x
                epilog          16
            ";
        }

        fn test_redeclared_let_reuses_slot() {
            let program = "let x = 1; let x = 2; exit(x);";
            let tree_ok = "
                global          _start
                section         text
                label           _start
                prolog          16
                =               x, 1
                =               x, 2
                exit            x
                epilog          16
            ";
        }

        fn test_function_with_parameter() {
            let program = "fn foo(x) { return x; }";
            let tree_ok = "
                global          _start
                section         text
                label           foo
                prolog          16
                parameter       1, 8, x
                return          x
                epilog          16
                ret
                label           _start
            ";
        }

        fn test_print_literals() {
            let program = "print(42); print(7);";
            let tree_ok = r#"
                global          _start
                section         data
                ascii           0, "42"
                ascii           1, "7"
                section         text
                label           _start
                print           0
                print           1
            "#;
        }

        fn test_print_literals_in_source_order() {
            let program = "fn f() { print(2); } print(1);";
            let tree_ok = r#"
                global          _start
                section         data
                ascii           0, "2"
                ascii           1, "1"
                section         text
                label           f
                print           0
                ret
                label           _start
                print           1
            "#;
        }

        fn test_call_with_temporaries() {
            let program = "fn add(a, b) { return a + b; } let x = 1; add(x * 2, 3);";
            let tree_ok = "
                global          _start
                section         text
                label           add
                prolog          32
                parameter       1, 8, a
                parameter       2, 8, b
                add             a, b, %t0
                return          %t0
                epilog          32
                ret
                label           _start
                prolog          32
                =               x, 1
                mul             x, 2, %t0
                store_parameter 1, %t0
                store_parameter 2, 3
                call            add
                epilog          32
            ";
        }

        fn test_nested_block_frame() {
            let program = "let x = 1; { let y = x + 1; exit(y); }";
            let tree_ok = "
                global          _start
                section         text
                label           _start
                prolog          16
                =               x, 1
                prolog          32
                add             x, 1, %t0
                =               y, %t0
                exit            y
                epilog          32
                epilog          16
            ";
        }

        fn test_nested_function_is_hoisted() {
            let program = "greet(); { fn greet() { print(1); } }";
            let tree_ok = r#"
                global          _start
                section         data
                ascii           0, "1"
                section         text
                label           greet
                print           0
                ret
                label           _start
                call            greet
            "#;
        }

        fn test_error_undefined_variable() {
            let program = "exit(y);";
            let expected_errors = &["5..6: undefined variable `y`"];
        }

        fn test_error_variable_out_of_scope() {
            let program = "{ let y = 1; } exit(y);";
            let expected_errors = &["20..21: undefined variable `y`"];
        }

        fn test_error_function_cannot_see_globals() {
            let program = "let x = 1; fn f() { exit(x); }";
            let expected_errors = &["25..26: undefined variable `x`"];
        }

        fn test_error_undefined_function() {
            let program = "foo();";
            let expected_errors = &["0..3: undefined function `foo`"];
        }

        fn test_error_arity_mismatch() {
            let program = "fn f(a) {} f();";
            let expected_errors = &["11..15: function `f` takes 1 argument(s), but 0 were given"];
        }

        fn test_error_duplicate_function() {
            let program = "fn f() {} fn f() {}";
            let expected_errors = &["13..14: function `f` is already defined"];
        }

        fn test_error_duplicate_parameter() {
            let program = "fn f(a, a) {}";
            let expected_errors = &["8..9: parameter `a` is declared twice"];
        }

        fn test_error_reserved_label() {
            let program = "fn p0() {}";
            let expected_errors = &["3..5: function name `p0` is reserved for print literals"];
        }

        fn test_error_return_outside_function() {
            let program = "return 1;";
            let expected_errors = &["0..9: `return` outside of a function"];
        }

        fn test_error_non_constant_print() {
            let program = "let x = 1; print(x);";
            let expected_errors = &["17..18: `print` requires a constant expression"];
        }

        fn test_error_division_by_zero() {
            let program = "exit(1 / 0);";
            let expected_errors = &["5..10: division by zero in constant expression"];
        }

        fn test_error_constant_overflow() {
            let program = "exit(9223372036854775807 + 1);";
            let expected_errors = &["5..28: constant expression overflows"];
        }
    );
}
