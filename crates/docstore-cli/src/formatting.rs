use bson::{Bson, Document};
use chrono::SecondsFormat;

use docstore_data::{documents, ID_FIELD};

macro_rules! next_value {
    ($old:ident, $new:ident) => {
        if $old != $new {
            format!(" -> {}", $new)
        } else {
            "".to_string()
        }
    };
}

/// Human readable rendering of a single value
pub fn format_value(value: &Bson) -> String {
    match value {
        Bson::String(s) => s.clone(),
        Bson::ObjectId(id) => id.to_hex(),
        Bson::DateTime(at) => at.to_chrono().to_rfc3339_opts(SecondsFormat::Millis, true),
        Bson::Null => "None".to_string(),
        other => documents::to_json(other).to_string(),
    }
}

/// Field of a document as text, empty when absent
pub fn field(doc: &Document, key: &str) -> String {
    doc.get(key).map(format_value).unwrap_or_default()
}

pub trait PrintFormatted {
    fn print_formatted(&self);
}

impl PrintFormatted for Document {
    fn print_formatted(&self) {
        println!("{:=<60}", "=");
        for (key, value) in self {
            println!("  {}: {}", key, format_value(value));
        }
        println!("{:=<60}", "=");
    }
}

/// Before and after of an update
impl PrintFormatted for (Document, Document) {
    fn print_formatted(&self) {
        let (old, new) = self;
        let keys = old
            .keys()
            .chain(new.keys().filter(|key| !old.contains_key(key.as_str())));
        for key in keys {
            let before = old.get(key).map(format_value).unwrap_or_else(|| "-".into());
            let after = new.get(key).map(format_value).unwrap_or_else(|| "-".into());
            let next = next_value!(before, after);
            println!("  {}: {}{}", key, before, next);
        }
    }
}

impl PrintFormatted for Vec<Document> {
    fn print_formatted(&self) {
        println!("{:<24}\t{}", "ID", "Document");
        println!("{:-<100}", "-");
        for doc in self {
            let mut rest = doc.clone();
            rest.remove(ID_FIELD);
            println!(
                "{:<24}\t{}",
                field(doc, ID_FIELD),
                documents::to_json(&Bson::Document(rest))
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use bson::{doc, oid::ObjectId, DateTime};

    use super::*;

    #[test]
    fn test_format_value() {
        let id = ObjectId::new();
        assert_eq!(format_value(&Bson::ObjectId(id)), id.to_hex());
        assert_eq!(format_value(&Bson::String("Seattle".into())), "Seattle");
        assert_eq!(format_value(&Bson::Int32(28)), "28");
        assert_eq!(format_value(&Bson::Null), "None");
        assert_eq!(
            format_value(&Bson::DateTime(DateTime::from_millis(0))),
            "1970-01-01T00:00:00.000Z"
        );
        assert_eq!(format_value(&Bson::Array(vec![1.into(), 2.into()])), "[1,2]");
    }

    #[test]
    fn test_field() {
        let doc = doc! { "name": "Alice", "age": 28 };
        assert_eq!(field(&doc, "name"), "Alice");
        assert_eq!(field(&doc, "age"), "28");
        assert_eq!(field(&doc, "email"), "");
    }
}
