//! Turns business events into task definitions.
//!
//! Generation is pure: the same event always yields the same definitions, in the
//! same order, and nothing is looked up or persisted here.

use serde_json::{Map as JsonMap, Value as JsonValue, json};
use tracing::debug;

use taskforge_events::{DomainEvent, EventType};

use crate::task::{Priority, Skill, TaskDefinition, TaskKind};

/// Sticker printing time per device, capped at [`STICKER_MAX_MINUTES`].
pub const STICKER_MINUTES_PER_DEVICE: u32 = 3;
pub const STICKER_MAX_MINUTES: u32 = 60;
/// Upper bound on the units a single purchase line can expand to.
pub const MAX_UNITS_PER_ITEM: usize = 10_000;

/// Generate the ordered task definitions for one event.
///
/// Event types outside the vocabulary generate nothing.
pub fn generate_from_event(event: &DomainEvent) -> Vec<TaskDefinition> {
    let payload = Payload::of(&event.payload);
    let source = event.event_type.source_key();

    let tasks = match &event.event_type {
        EventType::PurchaseConfirmed => purchase_confirmed(&source, &payload),
        EventType::InspectionComplete => inspection_complete(&source, &payload),
        EventType::InvoiceCompleted => invoice_completed(&source, &payload),
        EventType::DeviceSold => device_sold(&source, &payload),
        EventType::WarrantyClaim => warranty_claim(&source, &payload),
        EventType::StockLow => stock_low(&source, &payload),
        EventType::DailyTasks => daily_tasks(&source, &payload),
        EventType::Other(_) => Vec::new(),
    };

    debug!(event_type = %event.event_type, generated = tasks.len(), "tasks generated");
    tasks
}

fn purchase_confirmed(source: &str, payload: &Payload<'_>) -> Vec<TaskDefinition> {
    let invoice_id = payload.first(&["invoice_id", "invoiceId"]);
    let devices = expand_devices(payload.array("items"));
    let count = u32::try_from(devices.len()).unwrap_or(u32::MAX);

    let inspections = devices.iter().enumerate().map(|(index, device_id)| {
        TaskDefinition::new(TaskKind::Inspection, "Inspect device (batch)", "فحص جهاز - دفعة شراء")
            .with_skills([Skill::Inspection])
            .with_estimated_minutes(15)
            .with_source_reference(
                Reference::new(source)
                    .maybe("invoice_id", invoice_id)
                    .with("device_index", index)
                    .with("device_id", device_id.clone())
                    .build(),
            )
    });

    let preparations = devices.iter().enumerate().map(|(index, device_id)| {
        TaskDefinition::new(
            TaskKind::Preparation,
            "Prepare device after inspection",
            "تجهيز جهاز بعد الفحص",
        )
        .with_skills([Skill::Preparation])
        .with_estimated_minutes(20)
        .with_source_reference(
            Reference::new(source)
                .maybe("invoice_id", invoice_id)
                .with("device_index", index)
                .with("device_id", device_id.clone())
                .with("after_inspection", true)
                .build(),
        )
    });

    let mut tasks: Vec<TaskDefinition> = inspections.chain(preparations).collect();

    if count > 0 {
        tasks.push(
            TaskDefinition::new(
                TaskKind::Sticker,
                format!("Print and apply serial stickers (batch of {count})"),
                format!("طباعة ولصق ستيكرات السيريال - {count} جهاز"),
            )
            .with_priority(Priority::Low)
            .with_skills([Skill::Preparation])
            .with_estimated_minutes(
                count
                    .saturating_mul(STICKER_MINUTES_PER_DEVICE)
                    .min(STICKER_MAX_MINUTES),
            )
            .with_source_reference(
                Reference::new(source)
                    .maybe("invoice_id", invoice_id)
                    .with("count", count)
                    .build(),
            ),
        );
    }

    tasks
}

/// One device reference per unit: an item with `quantity: 3` stands for three
/// devices. The reference is the item's device id, its serial number, or a
/// positional `item-{n}` placeholder.
fn expand_devices(items: &[JsonValue]) -> Vec<JsonValue> {
    let mut devices = Vec::new();

    for item in items {
        let item = Payload::of(item);
        let quantity = item.number("quantity").map_or(1, unit_count);
        let reference = item.first(&["device_id", "serial_number"]).cloned();

        for _ in 0..quantity {
            let position = devices.len();
            devices.push(
                reference
                    .clone()
                    .unwrap_or_else(|| JsonValue::String(format!("item-{position}"))),
            );
        }
    }

    devices
}

/// Missing, zero or negative quantities count as one unit; fractions round up.
fn unit_count(quantity: f64) -> usize {
    if quantity.is_finite() && quantity >= 1.0 {
        (quantity.ceil() as usize).min(MAX_UNITS_PER_ITEM)
    } else {
        1
    }
}

fn inspection_complete(source: &str, payload: &Payload<'_>) -> Vec<TaskDefinition> {
    let result = payload.text(&["result", "inspection_result"]);
    if matches!(result, Some("fail" | "return")) {
        return Vec::new();
    }

    vec![
        TaskDefinition::new(TaskKind::Preparation, "Prepare device for sale", "تجهيز الجهاز للبيع")
            .with_skills([Skill::Preparation])
            .with_estimated_minutes(20)
            .with_source_reference(
                Reference::new(source)
                    .maybe("device_id", payload.first(&["device_id", "deviceId"]))
                    .build(),
            ),
    ]
}

fn invoice_completed(source: &str, payload: &Payload<'_>) -> Vec<TaskDefinition> {
    let invoice_id = payload.first(&["invoice_id", "invoiceId"]);
    let cod = payload.number("cod_amount").is_some_and(|amount| amount > 0.0)
        || payload.text(&["payment_type"]) == Some("cod");

    let packaging = TaskDefinition::new(
        TaskKind::Packaging,
        "Package order for delivery",
        "تغليف الطلب للتوصيل",
    )
    .with_skills([Skill::Preparation])
    .with_estimated_minutes(15)
    .with_source_reference(Reference::new(source).maybe("invoice_id", invoice_id).build());

    let delivery = TaskDefinition::new(
        TaskKind::Delivery,
        "Hand over to delivery company",
        "تسليم لشركة التوصيل",
    )
    .with_priority(if cod { Priority::High } else { Priority::Normal })
    .with_skills([Skill::Delivery])
    .with_estimated_minutes(30)
    .with_source_reference(
        Reference::new(source)
            .maybe("invoice_id", invoice_id)
            .with("cod", cod)
            .build(),
    )
    .requiring_approval(cod);

    vec![packaging, delivery]
}

fn device_sold(source: &str, payload: &Payload<'_>) -> Vec<TaskDefinition> {
    let reference = Reference::new(source)
        .maybe("invoice_id", payload.first(&["invoice_id", "invoiceId"]))
        .build();

    vec![
        TaskDefinition::new(TaskKind::Packaging, "Photo and package device", "تصوير وتغليف الجهاز")
            .with_skills([Skill::Preparation])
            .with_estimated_minutes(15)
            .with_source_reference(reference.clone()),
        TaskDefinition::new(
            TaskKind::Delivery,
            "Hand over to delivery company",
            "تسليم لشركة التوصيل",
        )
        .with_skills([Skill::Delivery])
        .with_estimated_minutes(20)
        .with_source_reference(reference),
    ]
}

fn warranty_claim(source: &str, payload: &Payload<'_>) -> Vec<TaskDefinition> {
    let reference = Reference::new(source)
        .maybe("claim_id", payload.first(&["claim_id", "warranty_claim_id"]))
        .build();

    vec![
        TaskDefinition::new(
            TaskKind::WarrantyInspect,
            "Inspect warranty claim device",
            "فحص جهاز مطالبة الضمان",
        )
        .with_priority(Priority::High)
        .with_skills([Skill::Inspection, Skill::Maintenance])
        .with_estimated_minutes(25)
        .with_source_reference(reference.clone()),
        TaskDefinition::new(TaskKind::WarrantySend, "Send device (warranty)", "إرسال الجهاز - ضمان")
            .with_skills([Skill::Delivery])
            .with_estimated_minutes(30)
            .with_source_reference(reference),
    ]
}

fn stock_low(source: &str, payload: &Payload<'_>) -> Vec<TaskDefinition> {
    // Payload fields are carried verbatim and win over the derived keys.
    let reference = Reference::new(source)
        .maybe("product_id", payload.first(&["product_id", "productId"]))
        .merge(payload.fields)
        .build();

    vec![
        TaskDefinition::new(
            TaskKind::StockOrder,
            "Create purchase order (low stock)",
            "إنشاء أمر شراء - مخزون منخفض",
        )
        .with_priority(Priority::High)
        .with_skills([Skill::Accounting])
        .with_estimated_minutes(45)
        .with_source_reference(reference)
        .requiring_approval(true),
    ]
}

fn daily_tasks(source: &str, payload: &Payload<'_>) -> Vec<TaskDefinition> {
    let kind = payload.text(&["kind"]).unwrap_or("cleaning");
    let date = payload.first(&["date"]);
    let mut tasks = Vec::new();

    if matches!(kind, "cleaning" | "all") {
        tasks.push(
            TaskDefinition::new(TaskKind::Cleaning, "Daily cleaning task", "مهمة تنظيف يومية")
                .with_priority(Priority::Low)
                .with_skills([Skill::Cleaning])
                .with_estimated_minutes(60)
                .with_source_reference(
                    Reference::new(source)
                        .with("kind", "cleaning")
                        .maybe("date", date)
                        .build(),
                ),
        );
    }

    if matches!(kind, "inventory" | "all") {
        tasks.push(
            TaskDefinition::new(TaskKind::Preparation, "Daily inventory check", "جرد يومي")
                .with_skills([Skill::Preparation])
                .with_estimated_minutes(90)
                .with_source_reference(
                    Reference::new(source)
                        .with("kind", "inventory")
                        .maybe("date", date)
                        .build(),
                ),
        );
    }

    if tasks.is_empty() {
        tasks.push(
            TaskDefinition::new(TaskKind::Cleaning, "Daily task", "مهمة يومية")
                .with_priority(Priority::Low)
                .with_skills([Skill::Cleaning])
                .with_estimated_minutes(60)
                .with_source_reference(Reference::new(source).merge(payload.fields).build()),
        );
    }

    tasks
}

/// Lenient view over an event payload. Anything that is not an object reads as
/// an empty object; `null`, `false` and `""` read as absent.
struct Payload<'a> {
    fields: Option<&'a JsonMap<String, JsonValue>>,
}

impl<'a> Payload<'a> {
    fn of(value: &'a JsonValue) -> Self {
        Self {
            fields: value.as_object(),
        }
    }

    /// First present value among alternative spellings.
    fn first(&self, names: &[&str]) -> Option<&'a JsonValue> {
        let fields = self.fields?;
        names
            .iter()
            .filter_map(|name| fields.get(*name))
            .find(|value| is_present(value))
    }

    fn text(&self, names: &[&str]) -> Option<&'a str> {
        self.first(names).and_then(JsonValue::as_str)
    }

    /// Numbers and numeric strings.
    fn number(&self, name: &str) -> Option<f64> {
        match self.first(&[name])? {
            JsonValue::Number(n) => n.as_f64(),
            JsonValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    fn array(&self, name: &str) -> &'a [JsonValue] {
        self.first(&[name])
            .and_then(JsonValue::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

fn is_present(value: &JsonValue) -> bool {
    match value {
        JsonValue::Null | JsonValue::Bool(false) => false,
        JsonValue::String(s) => !s.is_empty(),
        _ => true,
    }
}

/// `source_reference` builder; always starts with the event's source key.
struct Reference(JsonMap<String, JsonValue>);

impl Reference {
    fn new(source: &str) -> Self {
        let mut map = JsonMap::new();
        map.insert("event_type".to_string(), json!(source));
        Self(map)
    }

    fn with(mut self, key: &str, value: impl Into<JsonValue>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    fn maybe(self, key: &str, value: Option<&JsonValue>) -> Self {
        match value {
            Some(value) => self.with(key, value.clone()),
            None => self,
        }
    }

    fn merge(mut self, fields: Option<&JsonMap<String, JsonValue>>) -> Self {
        if let Some(fields) = fields {
            self.0
                .extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        self
    }

    fn build(self) -> JsonMap<String, JsonValue> {
        self.0
    }
}
