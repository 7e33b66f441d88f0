use quarry::plan::expr::{
    alias_col, col, concat, ifnull, lit_int, lit_str, Expr, Literal, ScalarFn,
};
use quarry::plan::parse::{parse_expr, ParseError};

#[test]
fn parses_plain_column() {
    assert_eq!(parse_expr("name").unwrap(), col("name"));
}

#[test]
fn parses_qualified_column() {
    assert_eq!(
        parse_expr("account.name").unwrap(),
        alias_col("account", "name")
    );
}

#[test]
fn parses_templated_qualifier() {
    assert_eq!(
        parse_expr("{alias}.optOut").unwrap(),
        alias_col("{alias}", "optOut")
    );
}

#[test]
fn parses_nested_functions() {
    let expr = parse_expr("IFNULL(CONCAT(firstName, ' ', lastName), lastName)").unwrap();
    assert_eq!(
        expr,
        ifnull(
            concat(vec![col("firstName"), lit_str(" "), col("lastName")]),
            col("lastName"),
        )
    );
}

#[test]
fn parses_literals() {
    assert_eq!(parse_expr("42").unwrap(), lit_int(42));
    assert_eq!(parse_expr("-7").unwrap(), lit_int(-7));
    assert_eq!(
        parse_expr("3.25").unwrap(),
        Expr::Literal(Literal::Float(3.25))
    );
    assert_eq!(parse_expr("TRUE").unwrap(), Expr::Literal(Literal::Bool(true)));
    assert_eq!(parse_expr("NULL").unwrap(), Expr::Literal(Literal::Null));
}

#[test]
fn parses_escaped_quote_in_string() {
    assert_eq!(
        parse_expr("'it''s'").unwrap(),
        Expr::Literal(Literal::String("it's".to_string()))
    );
}

#[test]
fn parses_timestamp_diff() {
    let expr = parse_expr("TIMESTAMPDIFF_SECOND(dateStart, dateEnd)").unwrap();
    match expr {
        Expr::Func { func, args } => {
            assert_eq!(func, ScalarFn::TimestampDiffSecond);
            assert_eq!(args.len(), 2);
        }
        other => panic!("unexpected expr: {other:?}"),
    }
}

#[test]
fn function_names_round_trip() {
    for func in [
        ScalarFn::Concat,
        ScalarFn::IfNull,
        ScalarFn::NullIf,
        ScalarFn::Mul,
        ScalarFn::Div,
        ScalarFn::TimestampDiffSecond,
        ScalarFn::Trim,
        ScalarFn::Lower,
        ScalarFn::Upper,
    ] {
        assert_eq!(ScalarFn::from_name(func.name()), Some(func));
    }
}

#[test]
fn rejects_unknown_function() {
    let err = parse_expr("SLEEP(10)").unwrap_err();
    assert!(matches!(err, ParseError::UnknownFunction { .. }));
}

#[test]
fn rejects_wrong_arity() {
    let err = parse_expr("IFNULL(name)").unwrap_err();
    assert!(matches!(err, ParseError::WrongArity { .. }));

    let err = parse_expr("LOWER(a, b)").unwrap_err();
    assert!(matches!(err, ParseError::WrongArity { .. }));
}

#[test]
fn rejects_unterminated_string() {
    let err = parse_expr("'oops").unwrap_err();
    assert!(matches!(err, ParseError::UnterminatedString { .. }));
}

#[test]
fn rejects_trailing_garbage() {
    assert!(parse_expr("name name").is_err());
}
