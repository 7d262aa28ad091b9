use shale_lexer::{lex, Lexer, TokenKind};

fn kinds(input: &str) -> Vec<TokenKind> {
    lex(input)
        .expect("lexing failed")
        .into_iter()
        .map(|token| token.kind)
        .collect()
}

#[test]
fn assignment_test() {
    assert_eq!(
        kinds("var = 3.14"),
        vec![
            TokenKind::Identifier(String::from("var")),
            TokenKind::Assign,
            TokenKind::LitReal(3.14),
        ]
    );
}

#[test]
fn compound_assignment_tokens_test() {
    assert_eq!(
        kinds("+= -= *= /= %= &= |= ^= <<= >>="),
        vec![
            TokenKind::PlusAssign,
            TokenKind::MinusAssign,
            TokenKind::StarAssign,
            TokenKind::SlashAssign,
            TokenKind::PercentAssign,
            TokenKind::AmpAssign,
            TokenKind::PipeAssign,
            TokenKind::CaretAssign,
            TokenKind::ShlAssign,
            TokenKind::ShrAssign,
        ]
    );
}

#[test]
fn string_escapes_test() {
    assert_eq!(
        kinds(r#""a\tb\n""#),
        vec![TokenKind::LitString(String::from("a\tb\n"))]
    );
}

#[test]
fn keywords_test() {
    assert_eq!(
        kinds("func f if else nil"),
        vec![
            TokenKind::Func,
            TokenKind::Identifier(String::from("f")),
            TokenKind::If,
            TokenKind::Else,
            TokenKind::Nil,
        ]
    );
}

#[test]
fn command_substitution_tokens_test() {
    assert_eq!(
        kinds("$(ls) ${x} $HOME"),
        vec![
            TokenKind::DollarLParen,
            TokenKind::Identifier(String::from("ls")),
            TokenKind::RParen,
            TokenKind::DollarLBrace,
            TokenKind::Identifier(String::from("x")),
            TokenKind::RBrace,
            TokenKind::Dollar,
            TokenKind::Identifier(String::from("HOME")),
        ]
    );
}

#[test]
fn blank_tracking_test() {
    let tokens = lex("ls -l").unwrap();
    assert!(!tokens[0].blank_before);
    assert!(tokens[1].blank_before, "blank before '-'");
    assert!(!tokens[2].blank_before, "no blank between '-' and 'l'");
}

#[test]
fn comments_are_skipped_test() {
    assert_eq!(
        kinds("1 # the rest is ignored\n2"),
        vec![
            TokenKind::LitInteger(1),
            TokenKind::Newline,
            TokenKind::LitInteger(2),
        ]
    );
}

#[test]
fn positions_test() {
    let tokens = lex("a\n  b").unwrap();
    assert_eq!((tokens[0].pos.line, tokens[0].pos.col), (1, 1));
    assert_eq!(tokens[1].kind, TokenKind::Newline);
    assert_eq!((tokens[2].pos.line, tokens[2].pos.col), (2, 3));
}

#[test]
fn unterminated_string_test() {
    let mut lexer = Lexer::new("\"oops");
    assert!(lexer.by_ref().count() == 0);
    assert!(lexer.take_error().is_some());
}

#[test]
fn shift_and_redirect_tokens_test() {
    assert_eq!(
        kinds("a << b >> c 2>&1"),
        vec![
            TokenKind::Identifier(String::from("a")),
            TokenKind::Shl,
            TokenKind::Identifier(String::from("b")),
            TokenKind::Shr,
            TokenKind::Identifier(String::from("c")),
            TokenKind::LitInteger(2),
            TokenKind::Greater,
            TokenKind::Amp,
            TokenKind::LitInteger(1),
        ]
    );
}
