use std::io::Write;

use crate::ast::*;

const INDENT_WIDTH: usize = 2;

pub fn print_program_string(program: &Program) -> String {
    let mut buf = Vec::with_capacity(1024);
    print_program(&mut buf, program).expect("writing to a Vec never fails");
    String::from_utf8(buf).expect("the tree is printed from UTF-8 sources")
}

pub fn print_program(w: &mut impl Write, program: &Program) -> std::io::Result<()> {
    for stmt in &program.statements {
        print_stmt(w, 0, stmt)?;
    }
    Ok(())
}

fn print_stmt(w: &mut impl Write, i: usize, stmt: &Stmt) -> std::io::Result<()> {
    sp(w, i)?;
    let span = stmt.span;
    match &stmt.kind {
        StmtKind::Let { name, value } => {
            writeln!(w, "let {name} ({span})")?;
            print_expr(w, i + 1, value)?;
        }
        StmtKind::Exit { status } => {
            writeln!(w, "exit ({span})")?;
            print_expr(w, i + 1, status)?;
        }
        StmtKind::Print { message } => {
            writeln!(w, "print ({span})")?;
            print_expr(w, i + 1, message)?;
        }
        StmtKind::Function(Function { name, params, body }) => {
            write!(w, "fn {name}(")?;
            for (idx, param) in params.iter().enumerate() {
                if idx > 0 {
                    write!(w, ", ")?;
                }
                write!(w, "{param}")?;
            }
            writeln!(w, ") ({span})")?;
            print_block(w, i + 1, body)?;
        }
        StmtKind::Call { callee, args } => {
            writeln!(w, "call {callee} ({span})")?;
            for arg in args {
                print_expr(w, i + 1, arg)?;
            }
        }
        StmtKind::Return { value } => {
            writeln!(w, "return ({span})")?;
            print_expr(w, i + 1, value)?;
        }
        StmtKind::Block(block) => {
            writeln!(w, "block ({span})")?;
            print_block(w, i + 1, block)?;
        }
    }
    Ok(())
}

fn print_block(w: &mut impl Write, i: usize, block: &Block) -> std::io::Result<()> {
    for stmt in &block.statements {
        print_stmt(w, i, stmt)?;
    }
    Ok(())
}

fn print_expr(w: &mut impl Write, i: usize, expr: &Expr) -> std::io::Result<()> {
    sp(w, i)?;
    let span = expr.span;
    match &expr.kind {
        ExprKind::Int(int) => writeln!(w, "int {int} ({span})"),
        ExprKind::Id(ident) => writeln!(w, "ident {ident} ({span})"),
        ExprKind::Binary { op, lhs, rhs } => {
            writeln!(w, "binary {op:?} ({span})")?;
            print_expr(w, i + 1, lhs)?;
            print_expr(w, i + 1, rhs)
        }
    }
}

fn sp(w: &mut impl Write, i: usize) -> std::io::Result<()> {
    write!(w, "{:width$}", "", width = i * INDENT_WIDTH)
}
