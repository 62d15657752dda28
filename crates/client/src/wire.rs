//! Translation between remote wire records and canonical ledger records.
//!
//! Inbound records are read leniently: field names may be the legacy Arabic
//! keys or their English aliases, numbers may arrive as strings, and an
//! unparseable date falls back to today. Outbound payloads use English keys
//! and ISO (`YYYY-MM-DD`) dates.

use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{Map, Value, json};

use selrs_core::date::{normalize_date, to_iso};
use selrs_core::{
    BaitInput, BaitRecord, InstaPayInput, InstaPayRecord, KhazinaInput, KhazinaRecord,
    LedgerRecord, QardInput, QardRecord, RecordId, SulfInput, SulfRecord,
};

use crate::error::RemoteError;

/// Response envelope returned by every data endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse<T> {
    #[serde(default)]
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub message: Option<String>,
    pub count: Option<u64>,
}

impl<T> ApiResponse<T> {
    /// Best human-readable failure text.
    pub fn failure_message(&self) -> Option<&str> {
        self.error.as_deref().or(self.message.as_deref())
    }
}

/// A ledger record with a remote wire representation.
pub trait WireRecord: LedgerRecord {
    /// Build a canonical record from a remote object.
    fn from_wire(value: &Value, today: NaiveDate) -> Result<Self, RemoteError>;

    /// Outbound create/update body.
    fn to_wire(input: &Self::Input) -> Value;
}

fn object<'a>(value: &'a Value) -> Result<&'a Map<String, Value>, RemoteError> {
    value
        .as_object()
        .ok_or_else(|| RemoteError::Parse(format!("expected a record object, got {value}")))
}

fn field<'a>(obj: &'a Map<String, Value>, names: &[&str]) -> Option<&'a Value> {
    names
        .iter()
        .filter_map(|name| obj.get(*name))
        .find(|value| !value.is_null())
}

fn number(obj: &Map<String, Value>, names: &[&str]) -> f64 {
    match field(obj, names) {
        Some(Value::Number(n)) => n.as_f64().unwrap_or_default(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()).unwrap_or_default(),
        _ => 0.0,
    }
}

fn text(obj: &Map<String, Value>, names: &[&str]) -> String {
    match field(obj, names) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

fn date(obj: &Map<String, Value>, names: &[&str], today: NaiveDate) -> String {
    normalize_date(&text(obj, names), today)
}

/// Server ids are numeric; anything else is kept verbatim, a missing id gets a local one.
fn record_id(obj: &Map<String, Value>) -> RecordId {
    match field(obj, &["ID", "id"]) {
        Some(Value::Number(n)) => match n.as_u64() {
            Some(id) => RecordId::from_remote(id),
            None => RecordId::generate(),
        },
        Some(Value::String(s)) => s.parse().unwrap_or_else(|_| RecordId::generate()),
        _ => RecordId::generate(),
    }
}

fn iso_date(date: &str) -> String {
    to_iso(date).unwrap_or_else(|| date.to_string())
}

impl WireRecord for KhazinaRecord {
    fn from_wire(value: &Value, today: NaiveDate) -> Result<Self, RemoteError> {
        let obj = object(value)?;
        let input = KhazinaInput {
            date: date(obj, &["التاريخ", "date"], today),
            income: number(obj, &["الايراد", "revenue", "income"]),
            expense: number(obj, &["المصروف", "expense"]),
            balance: number(obj, &["الرصيد", "balance"]),
            notes: text(obj, &["ملاحظات", "notes"]),
        };
        Ok(Self::from_input(record_id(obj), input))
    }

    fn to_wire(input: &KhazinaInput) -> Value {
        json!({
            "date": iso_date(&input.date),
            "revenue": input.income,
            "expense": input.expense,
            "notes": input.notes,
        })
    }
}

/// Fields shared by the counterparty ledgers, read with per-ledger key names.
struct CounterpartyFields {
    id: RecordId,
    name: String,
    principal: f64,
    payment: f64,
    date: String,
    notes: String,
}

fn counterparty(
    value: &Value,
    today: NaiveDate,
    principal: &[&str],
    payment: &[&str],
) -> Result<CounterpartyFields, RemoteError> {
    let obj = object(value)?;
    Ok(CounterpartyFields {
        id: record_id(obj),
        name: text(obj, &["الاسم", "name"]),
        principal: number(obj, principal),
        payment: number(obj, payment),
        date: date(obj, &["التاريخ", "date"], today),
        notes: text(obj, &["ملاحظات", "notes"]),
    })
}

macro_rules! counterparty_wire {
    ($record:ident, $input:ident, $principal:ident, $wire_principal:literal, [$($principal_key:literal),+], [$($payment_key:literal),+]) => {
        impl WireRecord for $record {
            fn from_wire(value: &Value, today: NaiveDate) -> Result<Self, RemoteError> {
                let f = counterparty(value, today, &[$($principal_key),+], &[$($payment_key),+])?;
                let input = $input {
                    name: f.name,
                    $principal: f.principal,
                    payment: f.payment,
                    date: f.date,
                    notes: f.notes,
                };
                Ok(Self::from_input(f.id, input))
            }

            fn to_wire(input: &$input) -> Value {
                json!({
                    "name": input.name,
                    "date": iso_date(&input.date),
                    $wire_principal: input.$principal,
                    "payment": input.payment,
                    "notes": input.notes,
                })
            }
        }
    };
}

counterparty_wire!(SulfRecord, SulfInput, advance, "advance", ["سلفه", "advance"], ["سداد", "payment"]);
counterparty_wire!(QardRecord, QardInput, amount, "amount", ["المبلغ", "amount"], ["سداد", "payment"]);
counterparty_wire!(BaitRecord, BaitInput, advance, "advance", ["معاه", "advance"], ["منه", "payment"]);
counterparty_wire!(InstaPayRecord, InstaPayInput, advance, "advance", ["معاه", "advance"], ["منه", "payment"]);

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 7, 1).unwrap()
    }

    #[test]
    fn khazina_reads_legacy_keys_and_string_numbers() {
        let wire = json!({
            "ID": 17,
            "التاريخ": "15/03/2025",
            "الايراد": "250.5",
            "المصروف": 50,
            "ملاحظات": "rent"
        });
        let rec = KhazinaRecord::from_wire(&wire, today()).unwrap();
        assert_eq!(rec.id, RecordId::from_remote(17));
        assert_eq!(rec.date, "15-03-2025");
        assert_eq!(rec.year, 2025);
        assert_eq!(rec.income, 250.5);
        assert_eq!(rec.expense, 50.0);
        assert_eq!(rec.total, 200.5);
        assert_eq!(rec.notes, "rent");
    }

    #[test]
    fn english_aliases_and_iso_timestamps_are_accepted() {
        let wire = json!({
            "id": "9",
            "date": "2024-12-31T00:00:00.000Z",
            "revenue": 10,
            "expense": "abc"
        });
        let rec = KhazinaRecord::from_wire(&wire, today()).unwrap();
        assert_eq!(rec.id.as_remote(), Some(9));
        assert_eq!(rec.date, "31-12-2024");
        assert_eq!(rec.expense, 0.0);
        assert_eq!(rec.total, 10.0);
    }

    #[test]
    fn unparseable_date_falls_back_to_today() {
        let wire = json!({ "id": 1, "name": "Omar", "amount": 500, "payment": 100, "date": "soon" });
        let rec = QardRecord::from_wire(&wire, today()).unwrap();
        assert_eq!(rec.date, "01-07-2025");
        assert_eq!(rec.remaining, 400.0);
    }

    #[test]
    fn bait_uses_its_own_legacy_keys() {
        let wire = json!({ "ID": 3, "الاسم": "Mona", "معاه": 300, "منه": 120, "التاريخ": "2025-01-05" });
        let rec = BaitRecord::from_wire(&wire, today()).unwrap();
        assert_eq!(rec.name, "Mona");
        assert_eq!(rec.advance, 300.0);
        assert_eq!(rec.payment, 120.0);
        assert_eq!(rec.remaining, 180.0);
    }

    #[test]
    fn instapay_reads_household_keys_and_english_aliases() {
        let wire = json!({ "ID": "8", "الاسم": "Hany", "معاه": "750", "منه": 250, "التاريخ": "31/12/2024" });
        let rec = InstaPayRecord::from_wire(&wire, today()).unwrap();
        assert_eq!(rec.id.as_remote(), Some(8));
        assert_eq!(rec.name, "Hany");
        assert_eq!(rec.advance, 750.0);
        assert_eq!(rec.payment, 250.0);
        assert_eq!(rec.remaining, 500.0);
        assert_eq!(rec.date, "31-12-2024");

        let wire = json!({ "id": 9, "name": "Sara", "advance": 40, "payment": 15, "notes": "fee" });
        let rec = InstaPayRecord::from_wire(&wire, today()).unwrap();
        assert_eq!(rec.remaining, 25.0);
        assert_eq!(rec.date, "01-07-2025");
        assert_eq!(rec.notes, "fee");
    }

    #[test]
    fn household_ledgers_send_advance_and_payment() {
        let input = BaitInput {
            name: "Mona".to_string(),
            advance: 300.0,
            payment: 120.0,
            date: "05-01-2025".to_string(),
            notes: "groceries".to_string(),
        };
        let expected = json!({
            "name": "Mona",
            "date": "2025-01-05",
            "advance": 300.0,
            "payment": 120.0,
            "notes": "groceries"
        });
        assert_eq!(BaitRecord::to_wire(&input), expected);

        let input = InstaPayInput {
            name: input.name,
            advance: input.advance,
            payment: input.payment,
            date: input.date,
            notes: input.notes,
        };
        assert_eq!(InstaPayRecord::to_wire(&input), expected);
    }

    #[test]
    fn non_object_is_a_parse_error() {
        let err = SulfRecord::from_wire(&json!([1, 2]), today()).unwrap_err();
        assert!(matches!(err, RemoteError::Parse(_)));
    }

    #[test]
    fn outbound_payloads_use_english_keys_and_iso_dates() {
        let body = KhazinaRecord::to_wire(&KhazinaInput {
            date: "15-03-2025".to_string(),
            income: 100.0,
            expense: 20.0,
            balance: 0.0,
            notes: "n".to_string(),
        });
        assert_eq!(
            body,
            json!({ "date": "2025-03-15", "revenue": 100.0, "expense": 20.0, "notes": "n" })
        );

        let body = QardRecord::to_wire(&QardInput {
            name: "Ali".to_string(),
            amount: 10.0,
            payment: 1.0,
            date: "01-02-2025".to_string(),
            notes: String::new(),
        });
        assert_eq!(body["amount"], json!(10.0));
        assert_eq!(body["date"], json!("2025-02-01"));
        assert!(body.get("advance").is_none());
    }
}
