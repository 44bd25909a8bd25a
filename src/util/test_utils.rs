use crate::{
    ast::Program,
    codegen::interface::{self, Arch},
    ir, lower,
    parser::{self, ExprParsing},
    util::fmt::tree,
};

/// Each variant contains the input.
pub enum Test {
    Parser(&'static str),
    ParserPrecedence(&'static str),
    Lower(&'static str),
    Codegen(Arch, &'static str),
}

pub enum Assertion {
    TreeOk(&'static str),
    TreeError(&'static str),
    ExpectedErrors(&'static [&'static str]),
}

fn parse(input: &str, mode: ExprParsing) -> (Program, Vec<String>) {
    let (program, errors) = match parser::parse_with(input, mode) {
        Ok(program) => (program, vec![]),
        Err((program, errors)) => (program, errors),
    };
    let errors = errors.iter().map(ToString::to_string).collect();
    (program, errors)
}

#[track_caller]
pub fn run_pipeline(test: Test) -> (String, Vec<String>) {
    match test {
        Test::Parser(input) => {
            let (program, errors) = parse(input, ExprParsing::LeftFold);
            (tree::print_program_string(&program), errors)
        }
        Test::ParserPrecedence(input) => {
            let (program, errors) = parse(input, ExprParsing::Precedence);
            (tree::print_program_string(&program), errors)
        }
        Test::Lower(input) => {
            let (program, mut errors) = parse(input, ExprParsing::LeftFold);
            match lower::lower(&program) {
                Ok(listing) => (ir::print_listing_string(&listing), errors),
                Err(error) => {
                    errors.push(error.to_string());
                    (String::new(), errors)
                }
            }
        }
        Test::Codegen(arch, input) => {
            let (program, mut errors) = parse(input, ExprParsing::LeftFold);
            let listing = match lower::lower(&program) {
                Ok(listing) => listing,
                Err(error) => {
                    errors.push(error.to_string());
                    return (String::new(), errors);
                }
            };
            match interface::generate(arch, &listing) {
                Ok(asm) => (asm, errors),
                Err(error) => {
                    errors.push(error.to_string());
                    (String::new(), errors)
                }
            }
        }
    }
}

#[track_caller]
pub fn run_assertion(
    assertion: Assertion,
    formatted_actual_tree: &str,
    formatted_actual_errors: &[String],
) {
    match assertion {
        Assertion::TreeOk(expected_tree) => {
            let expected_errors: &[&str] = &[];
            ::pretty_assertions::assert_eq!(formatted_actual_errors, expected_errors);
            ::pretty_assertions::assert_eq!(formatted_actual_tree.trim(), expected_tree.trim());
        }
        Assertion::TreeError(expected_tree) => {
            ::pretty_assertions::assert_eq!(formatted_actual_tree.trim(), expected_tree.trim());
        }
        Assertion::ExpectedErrors(expected_errors) => {
            ::pretty_assertions::assert_eq!(formatted_actual_errors, expected_errors);
        }
    }
}

macro_rules! tree_tests {
    (
        use $test_kind:ident;

        $(
            fn $test_name:ident() {
                let $source_kind:ident = $source:expr;
                $($assertions_tt:tt)*
            }
        )*
    ) => {
        $(
            #[test]
            fn $test_name() {
                let test: crate::util::test_utils::Test =
                    tree_tests!(@@get_test($test_kind, $source_kind), $source);
                let (formatted_actual_tree, formatted_actual_errors) =
                    crate::util::test_utils::run_pipeline(test);
                let ctx = (&formatted_actual_tree, &formatted_actual_errors);
                tree_tests!(@@expand_assertions, ctx, [$($assertions_tt)*]);
            }
        )*
    };

    (@@expand_assertions, $ctx:expr, []) => {};
    (@@expand_assertions, $ctx:expr, [
        let $assertion:ident = $assertion_expected:expr;
        $($rest_assertions_tt:tt)*
    ]) => {
        crate::util::test_utils::run_assertion(
            tree_tests!(@@assertion, $assertion, $assertion_expected),
            $ctx.0,
            $ctx.1,
        );
        tree_tests!(@@expand_assertions, $ctx, [$($rest_assertions_tt)*]);
    };

    (@@assertion, tree_ok, $expected:expr) => {
        crate::util::test_utils::Assertion::TreeOk(::indoc::indoc! { $expected })
    };
    (@@assertion, tree_error, $expected:expr) => {
        crate::util::test_utils::Assertion::TreeError(::indoc::indoc! { $expected })
    };
    (@@assertion, expected_errors, $expected:expr) => {
        crate::util::test_utils::Assertion::ExpectedErrors($expected)
    };

    (@@get_test(parser, program), $source:expr) => {
        crate::util::test_utils::Test::Parser($source)
    };
    (@@get_test(parser_precedence, program), $source:expr) => {
        crate::util::test_utils::Test::ParserPrecedence($source)
    };
    (@@get_test(lower, program), $source:expr) => {
        crate::util::test_utils::Test::Lower($source)
    };
    (@@get_test(aarch64, program), $source:expr) => {
        crate::util::test_utils::Test::Codegen(
            crate::codegen::interface::Arch::Aarch64,
            $source,
        )
    };
    (@@get_test(x86_64, program), $source:expr) => {
        crate::util::test_utils::Test::Codegen(
            crate::codegen::interface::Arch::X86_64,
            $source,
        )
    };
}
pub(crate) use tree_tests;
