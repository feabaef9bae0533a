//! Prompt templates for the four assistant actions
//!
//! Each builder embeds the caller's text verbatim. Callers make sure the
//! inputs are non-empty before building.

/// Short overview of a SQL Server script
pub fn build_overview_prompt(script: &str) -> String {
    format!(
        "Provide a short overview of the following SQL Server code, focusing on data types, \
         stored procedures, functions, transactions, etc.\n\n{script}"
    )
}

/// Mermaid.js ER diagram of the schema in `script`
pub fn build_erd_prompt(script: &str) -> String {
    format!(
        r#"I have a SQL Server database schema, and I need an Entity-Relationship Diagram (ERD) in Mermaid.js format. The ERD should include:

1. **Entities (Tables):**
   - Every table in the schema, with its name and attributes.

2. **Attributes (Columns):**
   - Every column of each table with its simplified data type.
   - Mark primary keys (PK), foreign keys (FK) and unique constraints (UK).

3. **Output Format:**
   - Provide the ERD **only** in Mermaid.js format. Do not include any additional text or explanation.
   - Use this structure for each table:
     ```
     erDiagram
         TABLE_NAME {{
             COLUMN_TYPE COLUMN_NAME PK/FK/UK
         }}
     ```

Here is the SQL Server schema:

{script}

Rules for the diagram:
- Use unique and simple entity names with no schema prefixes.
- Entity names may contain only letters, numbers and underscores (no spaces or special characters).
- Use Mermaid.js relationship syntax, e.g. ||--o{{ for one-to-many, ||--|| for one-to-one, }}o--o{{ for many-to-many.
- Define every relationship between entities.
- Simplify data types to basic types (e.g. INT, VARCHAR, DATE) without precision or scale.
- Output nothing but the Mermaid.js diagram block."#
    )
}

/// Full translation of `script` to PostgreSQL
pub fn build_convert_prompt(script: &str) -> String {
    format!(
        r#"I have a SQL Server database script that I need to convert to PostgreSQL. The conversion should be accurate, preserving all data types, stored procedures, functions, transactions, indexes, constraints, and relationships. Follow these steps so the converted code is fully functional in PostgreSQL.

--- Original SQL Server Code ---
{script}
---
## **Conversion Steps:**
1. **Schema and Table Conversion:**
   - Translate all CREATE TABLE statements.
   - Convert SQL Server data types to their PostgreSQL equivalents.
   - Retain primary keys, foreign keys, unique constraints, and default values.
2. **Indexes and Constraints:**
   - Convert all CREATE INDEX statements.
   - Translate constraints like CHECK, NOT NULL, etc.
3. **Stored Procedures and Functions:**
   - Rewrite all CREATE PROCEDURE and CREATE FUNCTION statements.
   - Adapt T-SQL syntax to PL/pgSQL, keeping the logic intact.
4. **Triggers:**
   - Convert any triggers to PostgreSQL syntax.
5. **Transactions:**
   - Make transaction control (BEGIN, COMMIT, ROLLBACK) compatible with PostgreSQL.
6. **Data Migration Scripts:**
   - Adjust data import/export scripts to PostgreSQL's COPY or \COPY commands.
7. **Sequences and Identity Columns:**
   - Translate IDENTITY columns to SERIAL or GENERATED columns.
   - Create sequences where necessary.
8. **Views:**
   - Convert all CREATE VIEW statements.
9. **Error Handling:**
   - Adapt error handling to PostgreSQL's exception handling.
10. **Testing and Validation:**
    - Provide SQL statements that test the integrity and functionality of the converted database.
## **Output Requirements:**
- Provide the complete converted PostgreSQL script.
- The syntax must be compatible with PostgreSQL 13 or later.
- Only provide the converted code in PostgreSQL format.
"#
    )
}

/// Review of `converted` against `original`
pub fn build_verify_prompt(original: &str, converted: &str) -> String {
    format!(
        "Check the following PostgreSQL code and the original SQL Server code. Confirm whether \
         the conversion is accurate and free of errors.\n\n\
         Original SQL Server Code:\n{original}\n\n\
         Converted PostgreSQL Code:\n{converted}\n\n\
         Provide your verification below."
    )
}
