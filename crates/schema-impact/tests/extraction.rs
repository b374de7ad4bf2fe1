//! Tests for dependency extraction through the public API.

use rstest::rstest;
use schema_impact::{
    DependencyExtractor, DependencyType, EntityRef, EntityType, ExtractError, Extraction,
    JoinConditionInfo, MAX_NESTING,
};

fn owner() -> EntityRef {
    EntityRef::named(EntityType::StoredProcedure, 7, "dbo.usp_Test")
}

fn extract(sql: &str) -> Extraction {
    DependencyExtractor::new()
        .extract(sql, &owner())
        .expect("extraction should succeed")
}

fn targets(extraction: &Extraction) -> Vec<(&str, DependencyType)> {
    extraction
        .dependencies
        .iter()
        .map(|d| (d.target_name.as_str(), d.dependency_type))
        .collect()
}

// === Reads and joins ===

#[test]
fn join_yields_both_tables_and_one_join_condition() {
    let extraction = extract("SELECT * FROM Customers c JOIN Orders o ON o.CustomerId = c.Id");

    assert_eq!(
        targets(&extraction),
        vec![
            ("Customers", DependencyType::Select),
            ("Orders", DependencyType::Select),
        ]
    );
    assert_eq!(
        extraction.join_conditions,
        vec![JoinConditionInfo {
            left_table: "Orders".to_string(),
            left_column: "CustomerId".to_string(),
            right_table: "Customers".to_string(),
            right_column: "Id".to_string(),
        }]
    );
}

#[test]
fn dependencies_carry_the_owner() {
    let extraction = extract("SELECT * FROM dbo.Orders");
    let dep = &extraction.dependencies[0];
    assert_eq!(dep.source_type, EntityType::StoredProcedure);
    assert_eq!(dep.source_id, 7);
    assert_eq!(dep.target_type, EntityType::Table);
}

// === Writes ===

#[test]
fn update_tags_target_as_write() {
    let extraction = extract("UPDATE Orders SET Status = @s WHERE CustomerId = @c");
    assert_eq!(targets(&extraction), vec![("Orders", DependencyType::Update)]);
}

#[test]
fn update_reads_in_where_are_tagged_select() {
    let extraction = extract(
        "UPDATE Orders SET Status = @s
         WHERE CustomerId IN (SELECT Id FROM Customers WHERE IsBlocked = 1)",
    );
    assert_eq!(
        targets(&extraction),
        vec![
            ("Orders", DependencyType::Update),
            ("Customers", DependencyType::Select),
        ]
    );
}

#[rstest]
#[case::insert_values("INSERT INTO dbo.Audit (Id) VALUES (@id)", DependencyType::Insert)]
#[case::insert_no_into("INSERT dbo.Audit (Id) VALUES (@id)", DependencyType::Insert)]
#[case::delete("DELETE FROM dbo.Audit WHERE Id = @id", DependencyType::Delete)]
#[case::delete_no_from("DELETE dbo.Audit WHERE Id = @id", DependencyType::Delete)]
#[case::truncate("TRUNCATE TABLE dbo.Audit", DependencyType::Delete)]
fn write_statements_tag_their_target(#[case] sql: &str, #[case] expected: DependencyType) {
    let extraction = extract(sql);
    assert_eq!(targets(&extraction), vec![("dbo.Audit", expected)]);
}

#[test]
fn insert_select_reads_its_source() {
    let extraction = extract("INSERT INTO dbo.Archive (Id) SELECT Id FROM dbo.Orders WHERE Closed = 1");
    assert_eq!(
        targets(&extraction),
        vec![
            ("dbo.Archive", DependencyType::Insert),
            ("dbo.Orders", DependencyType::Select),
        ]
    );
}

// === Procedure calls ===

#[test]
fn exec_yields_one_procedure_reference() {
    let extraction = extract("EXEC dbo.GetOrders");
    assert_eq!(extraction.dependencies.len(), 1);
    let dep = &extraction.dependencies[0];
    assert_eq!(dep.target_type, EntityType::StoredProcedure);
    assert_eq!(dep.target_name, "dbo.GetOrders");
    assert_eq!(dep.dependency_type, DependencyType::Exec);
}

#[test]
fn dynamic_sql_is_counted_not_reported() {
    let extraction = extract("DECLARE @sql NVARCHAR(MAX) = 'SELECT 1'; EXEC (@sql);");
    assert!(extraction.dependencies.is_empty());
    assert_eq!(extraction.dynamic_sql, 1);
}

// === Whole definitions ===

#[test]
fn procedure_definition_body_is_analysed() {
    let extraction = extract(
        "CREATE PROCEDURE dbo.usp_CloseOrder @id INT AS
         BEGIN
             SET NOCOUNT ON;
             IF EXISTS (SELECT 1 FROM dbo.Orders WHERE Id = @id)
             BEGIN
                 UPDATE dbo.Orders SET Status = 3 WHERE Id = @id;
                 EXEC dbo.usp_Notify @id;
             END
         END",
    );
    assert_eq!(
        targets(&extraction),
        vec![
            ("dbo.Orders", DependencyType::Select),
            ("dbo.Orders", DependencyType::Update),
            ("dbo.usp_Notify", DependencyType::Exec),
        ]
    );
}

#[rstest]
#[case::empty("")]
#[case::whitespace("  \n\t ")]
fn blank_definitions_are_not_errors(#[case] sql: &str) {
    assert!(extract(sql).is_empty());
}

#[test]
fn pathological_nesting_is_an_error() {
    let depth = MAX_NESTING * 2;
    let sql = format!(
        "SELECT * FROM dbo.T WHERE Id = {}1{}",
        "(".repeat(depth),
        ")".repeat(depth)
    );
    let result = DependencyExtractor::new().extract(&sql, &owner());
    assert!(matches!(result, Err(ExtractError::NestingTooDeep { .. })));
}
