use shale_core::ast::*;
use shale_parser::parse;

fn single_stmt(input: &str) -> Stmt {
    let mut block = parse(input).expect("parsing failed");
    assert_eq!(block.stmts.len(), 1, "expected a single statement");
    block.stmts.remove(0)
}

#[test]
fn multi_assignment_test() {
    let stmt = single_stmt("a, b, c = 1, 2, 3");
    match stmt {
        Stmt::Assignment(assign) => {
            assert_eq!(assign.targets.len(), 3);
            assert_eq!(assign.values.len(), 3);
            assert_eq!(assign.op, AssignOp::Assign);
        }
        other => panic!("expected an assignment, got {:?}", other),
    }
}

#[test]
fn compound_indexed_assignment_test() {
    let stmt = single_stmt("a[1] += 10");
    match stmt {
        Stmt::Assignment(assign) => {
            assert_eq!(assign.op, AssignOp::Add);
            assert!(matches!(assign.targets[0], Expr::Index { .. }));
        }
        other => panic!("expected an assignment, got {:?}", other),
    }
}

#[test]
fn call_is_not_a_command_test() {
    let stmt = single_stmt("print(1 + 2)");
    assert!(matches!(stmt, Stmt::Expr(Expr::Call { .. })));
}

#[test]
fn bare_words_are_a_command_test() {
    let stmt = single_stmt("ls -l /tmp");
    match stmt {
        Stmt::Cmd(full) => {
            let stage = &full.cmd.first.stages[0];
            assert_eq!(stage.cmd.words.len(), 3);
            assert_eq!(
                stage.cmd.words[1].pieces,
                vec![CmdPiece::Lit("-l".to_string())]
            );
            assert_eq!(
                stage.cmd.words[2].pieces,
                vec![CmdPiece::Lit("/tmp".to_string())]
            );
        }
        other => panic!("expected a command, got {:?}", other),
    }
}

#[test]
fn pipeline_and_redirect_test() {
    let stmt = single_stmt("cat in.txt | sort -r > out.txt");
    match stmt {
        Stmt::Cmd(full) => {
            assert!(!full.background);
            let stages = &full.cmd.first.stages;
            assert_eq!(stages.len(), 2);
            assert!(stages[0].redirects.is_empty());
            match &stages[1].redirects[0] {
                IoRedirect::Out { fd, append, .. } => {
                    assert_eq!(*fd, 1);
                    assert!(!append);
                }
                other => panic!("expected an output redirect, got {:?}", other),
            }
        }
        other => panic!("expected a command, got {:?}", other),
    }
}

#[test]
fn stderr_redirects_test() {
    let stmt = single_stmt("make 2> err.log");
    match stmt {
        Stmt::Cmd(full) => match &full.cmd.first.stages[0].redirects[0] {
            IoRedirect::Out { fd, .. } => assert_eq!(*fd, 2),
            other => panic!("expected an output redirect, got {:?}", other),
        },
        other => panic!("expected a command, got {:?}", other),
    }

    let stmt = single_stmt("make 2>&1");
    match stmt {
        Stmt::Cmd(full) => match &full.cmd.first.stages[0].redirects[0] {
            IoRedirect::Dup { from, to } => {
                assert_eq!(*from, 2);
                assert_eq!(*to, 1);
            }
            other => panic!("expected a descriptor duplication, got {:?}", other),
        },
        other => panic!("expected a command, got {:?}", other),
    }
}

#[test]
fn background_and_combinators_test() {
    let stmt = single_stmt("sleep 5 &");
    match stmt {
        Stmt::Cmd(full) => assert!(full.background),
        other => panic!("expected a command, got {:?}", other),
    }

    let stmt = single_stmt("true && echo yes || echo no");
    match stmt {
        Stmt::Cmd(full) => {
            assert_eq!(full.cmd.rest.len(), 2);
            assert_eq!(full.cmd.rest[0].0, AndOrOp::And);
            assert_eq!(full.cmd.rest[1].0, AndOrOp::Or);
        }
        other => panic!("expected a command, got {:?}", other),
    }
}

#[test]
fn command_interpolation_test() {
    let stmt = single_stmt("echo $HOME/${name}.txt");
    match stmt {
        Stmt::Cmd(full) => {
            let word = &full.cmd.first.stages[0].cmd.words[1];
            assert_eq!(word.pieces.len(), 4);
            assert_eq!(word.pieces[0], CmdPiece::Var("HOME".to_string()));
            assert_eq!(word.pieces[1], CmdPiece::Lit("/".to_string()));
            assert!(matches!(word.pieces[2], CmdPiece::Expr(_)));
            assert_eq!(word.pieces[3], CmdPiece::Lit(".txt".to_string()));
        }
        other => panic!("expected a command, got {:?}", other),
    }
}

#[test]
fn command_substitution_expression_test() {
    let stmt = single_stmt(r#"r = $(echo "a b c" | tr " " "\n")"#);
    match stmt {
        Stmt::Assignment(assign) => match &assign.values[0] {
            Expr::CmdSub(cmd, _) => assert_eq!(cmd.first.stages.len(), 2),
            other => panic!("expected a command substitution, got {:?}", other),
        },
        other => panic!("expected an assignment, got {:?}", other),
    }
}

#[test]
fn for_in_with_tuple_pattern_test() {
    let stmt = single_stmt("for k, v in m { print(k) }");
    match stmt {
        Stmt::ForIn(stmt) => assert_eq!(stmt.targets.len(), 2),
        other => panic!("expected a for-in, got {:?}", other),
    }
}

#[test]
fn else_if_chain_test() {
    let stmt = single_stmt("if a { } else if b { } else { }");
    match stmt {
        Stmt::If(stmt) => match stmt.alt.as_deref() {
            Some(Stmt::If(nested)) => assert!(nested.alt.is_some()),
            other => panic!("expected a nested if, got {:?}", other),
        },
        other => panic!("expected an if, got {:?}", other),
    }
}

#[test]
fn nested_function_is_a_closure_test() {
    let block = parse("func mk() { func inc() { return 1 } }").unwrap();
    match &block.stmts[0] {
        Stmt::FuncDecl(outer) => {
            assert!(!outer.is_closure);
            match &outer.body.stmts[0] {
                Stmt::FuncDecl(inner) => assert!(inner.is_closure),
                other => panic!("expected a function declaration, got {:?}", other),
            }
        }
        other => panic!("expected a function declaration, got {:?}", other),
    }
}

#[test]
fn break_outside_loop_is_rejected_test() {
    assert!(parse("break").is_err());
    assert!(parse("func f() { break }").is_err());
    assert!(parse("while true { break }").is_ok());
    assert!(parse("switch x { case 1 { break } }").is_ok());
}

#[test]
fn continue_outside_loop_is_rejected_test() {
    assert!(parse("continue").is_err());
    assert!(parse("switch x { case 1 { continue } }").is_err());
    assert!(parse("for x in y { continue }").is_ok());
}

#[test]
fn return_outside_function_is_rejected_test() {
    assert!(parse("return 1").is_err());
    assert!(parse("func f() { return 1 }").is_ok());
}

#[test]
fn slice_expression_test() {
    let stmt = single_stmt("x = a[1:3]");
    match stmt {
        Stmt::Assignment(assign) => match &assign.values[0] {
            Expr::Index { index, .. } => assert!(matches!(**index, Expr::Slice { .. })),
            other => panic!("expected a subscript, got {:?}", other),
        },
        other => panic!("expected an assignment, got {:?}", other),
    }
}

#[test]
fn short_circuit_operand_shape_test() {
    let stmt = single_stmt("print(0 or \"x\")");
    match stmt {
        Stmt::Expr(Expr::Call { args, .. }) => {
            assert!(matches!(args[0], Expr::Binary(BinOp::Or, _, _, _)));
        }
        other => panic!("expected a call, got {:?}", other),
    }
}

#[test]
fn class_body_rejects_loose_statements_test() {
    assert!(parse("class A { while true { } }").is_err());
    assert!(parse("class A { func m(this) { } x = 1 }").is_ok());
}

#[test]
fn variadic_parameter_test() {
    let block = parse("func f(a, rest...) { }").unwrap();
    match &block.stmts[0] {
        Stmt::FuncDecl(decl) => {
            assert!(!decl.params[0].variadic);
            assert!(decl.params[1].variadic);
        }
        other => panic!("expected a function declaration, got {:?}", other),
    }
}

#[test]
fn alias_declaration_test() {
    let stmt = single_stmt("alias ll = ls -l");
    match stmt {
        Stmt::Alias(decl) => {
            assert_eq!(decl.name, "ll");
            assert_eq!(decl.words.len(), 2);
        }
        other => panic!("expected an alias declaration, got {:?}", other),
    }
}
