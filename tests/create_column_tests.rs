// Column factory and type-string handling.

use clickhouse_columns::{
    column::{
        create_column,
        enum_column::parse_enum_items,
        Column,
        ColumnArray,
        ColumnEnum8,
        ColumnLowCardinality,
        ColumnMap,
        ColumnNullable,
        ColumnTuple,
        ColumnVariant,
        Value,
    },
    Error,
    ErrorClass,
    Type,
};

fn create(type_str: &str) -> Box<dyn Column> {
    create_column(&Type::parse(type_str).unwrap()).unwrap()
}

#[test]
fn test_factory_builds_matching_tree() {
    let col = create("Array(Nullable(String))");
    let array = col.downcast_ref::<ColumnArray>().unwrap();
    assert!(array.nested().downcast_ref::<ColumnNullable>().is_some());

    assert!(create("LowCardinality(Nullable(String))")
        .downcast_ref::<ColumnLowCardinality>()
        .unwrap()
        .is_nullable());
    assert!(create("Map(String, UInt8)").downcast_ref::<ColumnMap>().is_some());
    assert!(create("Tuple(a UInt8, b String)")
        .downcast_ref::<ColumnTuple>()
        .is_some());
    assert!(create("Variant(String, UInt8)")
        .downcast_ref::<ColumnVariant>()
        .is_some());

    let nested = create("Nested(a UInt8, b String)");
    assert_eq!(nested.column_type().name(), "Nested(a UInt8, b String)");
    let array = nested.downcast_ref::<ColumnArray>().unwrap();
    assert_eq!(array.nested().column_type().name(), "Tuple(a UInt8, b String)");
}

#[test]
fn test_every_kind_reports_its_type() {
    for type_str in [
        "UInt8",
        "Int64",
        "Float32",
        "String",
        "FixedString(8)",
        "Date",
        "Date32",
        "DateTime('Asia/Tokyo')",
        "DateTime64(6)",
        "Decimal(18, 3)",
        "UUID",
        "Enum16('x' = 1000)",
        "Array(Array(UInt32))",
        "Map(LowCardinality(String), Nullable(Float64))",
        "Variant(Array(String), UInt64)",
    ] {
        assert_eq!(create(type_str).column_type().name(), type_str);
    }
}

#[test]
fn test_invalid_nesting_rejected() {
    for type_str in
        ["Nullable(Array(UInt8))", "Nullable(LowCardinality(String))"]
    {
        let err = create_column(&Type::parse(type_str).unwrap()).unwrap_err();
        assert!(matches!(err, Error::MalformedType { .. }), "{}", type_str);
        assert_eq!(err.class(), ErrorClass::Metadata);
    }
}

#[test]
fn test_malformed_type_strings() {
    for type_str in [
        "Array(",
        "Tuple(a UInt8, String)",
        "Enum8('a' 1)",
        "Decimal(40, 2)",
    ] {
        assert!(Type::parse(type_str).is_err(), "{}", type_str);
    }
}

#[test]
fn test_enum_parse_reports_fragment() {
    match parse_enum_items("'ok' = 1, 'bad' = one") {
        Err(Error::MalformedType { fragment, .. }) => {
            assert_eq!(fragment, "'bad' = one")
        }
        other => panic!("unexpected: {:?}", other),
    }
}

#[test]
fn test_enum_redeclared_between_blocks() {
    let mut col = ColumnEnum8::from_declared("Enum8('a' = 1)").unwrap();
    col.append_value(&Value::String("a".into())).unwrap();
    assert_eq!(col.code_of("a"), Some(1));

    col.set_declared_type("Enum8('b' = 2)").unwrap();
    assert_eq!(col.code_of("a"), None);
    assert_eq!(col.code_of("b"), Some(2));
    assert_eq!(col.name_of(2).as_deref(), Some("b"));
    assert!(col.append_value(&Value::String("a".into())).is_err());

    // same string by value keeps the table
    col.set_declared_type(&String::from("Enum8('b' = 2)")).unwrap();
    assert_eq!(col.name_of(2).as_deref(), Some("b"));
}
