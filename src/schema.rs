use serde::{Deserialize, Serialize};

/// Column types as BigQuery reports them, in Standard SQL spelling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DataType {
    String,
    Int64,
    Float64,
    Numeric,
    Bool,
    Date,
    DateTime,
    Timestamp,
    Unknown(String),
}

impl DataType {
    pub fn parse(name: &str) -> Self {
        match name.trim().to_uppercase().as_str() {
            "STRING" => DataType::String,
            "INT64" | "INTEGER" => DataType::Int64,
            "FLOAT64" | "FLOAT" => DataType::Float64,
            "NUMERIC" | "BIGNUMERIC" => DataType::Numeric,
            "BOOL" | "BOOLEAN" => DataType::Bool,
            "DATE" => DataType::Date,
            "DATETIME" => DataType::DateTime,
            "TIMESTAMP" => DataType::Timestamp,
            other => DataType::Unknown(other.to_string()),
        }
    }

    pub fn to_sql_type(&self) -> String {
        match self {
            DataType::String => "STRING".to_string(),
            DataType::Int64 => "INT64".to_string(),
            DataType::Float64 => "FLOAT64".to_string(),
            DataType::Numeric => "NUMERIC".to_string(),
            DataType::Bool => "BOOL".to_string(),
            DataType::Date => "DATE".to_string(),
            DataType::DateTime => "DATETIME".to_string(),
            DataType::Timestamp => "TIMESTAMP".to_string(),
            DataType::Unknown(t) => t.clone(),
        }
    }
}

impl From<String> for DataType {
    fn from(name: String) -> Self {
        DataType::parse(&name)
    }
}

impl From<DataType> for String {
    fn from(data_type: DataType) -> Self {
        data_type.to_sql_type()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    pub data_type: DataType,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSchema {
    /// Fully qualified `project.dataset.table` name
    pub name: String,
    pub columns: Vec<ColumnSchema>,
}

const INV_TRANSACTION_COLUMNS: &[(&str, &str, &str)] = &[
    ("ProductId", "STRING", "ProductId"),
    ("StoreId", "STRING", "StoreId"),
    ("TypeId", "STRING", "Invoice type ID."),
    ("InvoiceNo", "STRING", "Invoice number."),
    ("Reorder_Cause_ID", "STRING", "Reorder id."),
    ("Quantity", "INT64", "Quantity of products in each invoices."),
    ("CustomerID", "STRING", "Customer ID."),
    ("Customer", "STRING", "Customer name."),
    ("Country", "STRING", "Customer country."),
    ("OpticMainID", "STRING", "Optical ID for each customer."),
    ("Category", "STRING", "Customer category."),
    ("zoneId", "STRING", "Zone ID."),
    ("InvoiceDate", "DATE", "Invoice Date."),
    ("InvoiceYear", "INT64", "Invoice Year."),
    ("InvoiceMonth", "INT64", "Invoice Month."),
    ("InvoiceDay", "INT64", "Invoice day."),
    ("InvoiceWeek", "INT64", "Invoice week."),
    ("InvoiceQuarter", "INT64", "Invoice quarter."),
    (
        "type_name",
        "STRING",
        "Type of invoice including Credit Note, Debit Note, Invoice Sales, Other charge",
    ),
    ("lenstype", "STRING", "lenstype"),
    ("Part_Description", "STRING", "Product description"),
    ("Material_Type", "STRING", "Type of material."),
    ("Lens_Type", "STRING", "Type of lens."),
    ("price", "FLOAT64", "Price of each products."),
    ("cause", "STRING", "cause of reorder."),
    ("Store", "STRING", "Store name."),
    ("Zoning_ProvinceEN", "STRING", "Province(English)"),
    ("Zoning_ProvinceTH", "STRING", "Province(Thai)"),
    ("Zoning_Region", "STRING", "Region"),
];

impl TableSchema {
    /// The invoice transaction table the assistant answers questions about.
    pub fn inv_transaction() -> Self {
        Self {
            name: "madt-finalproject.finalproject_data.inv_transaction".to_string(),
            columns: INV_TRANSACTION_COLUMNS
                .iter()
                .map(|(name, data_type, description)| ColumnSchema {
                    name: name.to_string(),
                    data_type: DataType::parse(data_type),
                    description: description.to_string(),
                })
                .collect(),
        }
    }

    /// Short table name, the last segment of the qualified name.
    pub fn short_name(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or(&self.name)
    }

    // Markdown data dictionary used as LLM context
    pub fn to_data_dictionary(&self) -> String {
        let mut dictionary = format!("Table '{}'\n", self.name);
        dictionary.push_str("| Column Name | Data Type | Description |\n");
        dictionary.push_str("|-------------|-----------|-------------|\n");

        for column in &self.columns {
            dictionary.push_str(&format!(
                "| {} | {} | {} |\n",
                column.name,
                column.data_type.to_sql_type(),
                column.description
            ));
        }

        dictionary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_legacy_and_standard_type_names() {
        assert_eq!(DataType::parse("INTEGER"), DataType::Int64);
        assert_eq!(DataType::parse("int64"), DataType::Int64);
        assert_eq!(DataType::parse("FLOAT"), DataType::Float64);
        assert_eq!(DataType::parse("BOOLEAN"), DataType::Bool);
        assert_eq!(
            DataType::parse("GEOGRAPHY"),
            DataType::Unknown("GEOGRAPHY".to_string())
        );
    }

    #[test]
    fn data_dictionary_lists_every_column() {
        let schema = TableSchema::inv_transaction();
        let dictionary = schema.to_data_dictionary();

        assert!(dictionary.starts_with(
            "Table 'madt-finalproject.finalproject_data.inv_transaction'\n"
        ));
        assert!(dictionary.contains("| Quantity | INT64 | Quantity of products in each invoices. |"));
        assert!(dictionary.contains("| price | FLOAT64 | Price of each products. |"));
        // header + separator + one row per column
        assert_eq!(dictionary.lines().count(), schema.columns.len() + 3);
    }

    #[test]
    fn short_name_drops_project_and_dataset() {
        assert_eq!(TableSchema::inv_transaction().short_name(), "inv_transaction");
    }
}
