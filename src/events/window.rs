use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use tracing::warn;

/// Геометрия окна относительно виртуального рабочего стола (в пикселях).
///
/// `x`/`y` могут быть отрицательными при нескольких мониторах.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WindowShape {
    #[serde(deserialize_with = "pixel")]
    pub x: i32,
    #[serde(deserialize_with = "pixel")]
    pub y: i32,
    #[serde(deserialize_with = "pixel")]
    pub w: i32,
    #[serde(deserialize_with = "pixel")]
    pub h: i32,
}

impl WindowShape {
    pub const fn new(x: i32, y: i32, w: i32, h: i32) -> Self {
        Self { x, y, w, h }
    }

    /// Центр окна в координатах рабочего стола
    pub fn center(&self) -> (f64, f64) {
        (
            self.x as f64 + self.w as f64 * 0.5,
            self.y as f64 + self.h as f64 * 0.5,
        )
    }

    pub fn translated(self, dx: i32, dy: i32) -> Self {
        Self {
            x: self.x.saturating_add(dx),
            y: self.y.saturating_add(dy),
            ..self
        }
    }
}

impl fmt::Display for WindowShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}+{}+{}", self.w, self.h, self.x, self.y)
    }
}

// Другие контексты могут записать дробные координаты (JSON number), округляем
fn pixel<'de, D>(deserializer: D) -> Result<i32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = f64::deserialize(deserializer)?;
    if !value.is_finite() {
        return Err(serde::de::Error::custom("координата должна быть конечным числом"));
    }
    Ok(value.round().clamp(i32::MIN as f64, i32::MAX as f64) as i32)
}

/// Запись об одном контексте: идентификатор + геометрия
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowRecord {
    pub id: String,
    pub shape: WindowShape,
    #[serde(default, rename = "metaData", skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl WindowRecord {
    pub fn new(id: impl Into<String>, shape: WindowShape) -> Self {
        Self {
            id: id.into(),
            shape,
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

impl fmt::Display for WindowRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\" ({})", self.id, self.shape)
    }
}

/// Упорядоченный набор окон без повторяющихся `id`.
///
/// Это лишь снимок "наилучшего усилия": в нём могут остаться записи упавших
/// контекстов и может не быть окон, чья первая публикация ещё не дошла.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct WindowSet(Vec<WindowRecord>);

impl WindowSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Строгий разбор JSON-массива записей
    pub fn try_parse(raw: &str) -> serde_json::Result<Self> {
        let records: Vec<WindowRecord> = serde_json::from_str(raw)?;
        Ok(records.into_iter().collect())
    }

    /// Разбор значения из общего хранилища: отсутствующее или битое значение
    /// превращается в пустой набор
    pub fn parse(raw: Option<&str>) -> Self {
        let Some(raw) = raw else {
            return Self::new();
        };

        match Self::try_parse(raw) {
            Ok(set) => set,
            Err(e) => {
                warn!("Некорректное состояние окон в хранилище, считаем набор пустым: {}", e);
                Self::new()
            }
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.0)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, WindowRecord> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[WindowRecord] {
        &self.0
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.0.iter().position(|record| record.id == id)
    }

    pub fn get(&self, id: &str) -> Option<&WindowRecord> {
        self.0.iter().find(|record| record.id == id)
    }

    /// Заменить запись с тем же `id` на месте или добавить в конец
    pub fn upsert(&mut self, record: WindowRecord) {
        match self.position(&record.id) {
            Some(index) => self.0[index] = record,
            None => self.0.push(record),
        }
    }

    /// Обновить геометрию существующей записи. Возвращает `false`, если записи нет
    pub fn set_shape(&mut self, id: &str, shape: WindowShape) -> bool {
        match self.0.iter_mut().find(|record| record.id == id) {
            Some(record) => {
                record.shape = shape;
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, id: &str) -> Option<WindowRecord> {
        self.position(id).map(|index| self.0.remove(index))
    }

    pub fn to_vec(&self) -> Vec<WindowRecord> {
        self.0.clone()
    }
}

impl FromIterator<WindowRecord> for WindowSet {
    fn from_iter<I: IntoIterator<Item = WindowRecord>>(iter: I) -> Self {
        let mut set = WindowSet::new();
        for record in iter {
            set.upsert(record);
        }
        set
    }
}

impl<'de> Deserialize<'de> for WindowSet {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let records = Vec::<WindowRecord>::deserialize(deserializer)?;
        Ok(records.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a WindowSet {
    type Item = &'a WindowRecord;
    type IntoIter = std::slice::Iter<'a, WindowRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_wire_format() {
        let raw = r#"[{"id":"a1","shape":{"x":0,"y":0,"w":800,"h":600}},
                      {"id":"b1","shape":{"x":-800,"y":10.6,"w":800,"h":600}}]"#;
        let set = WindowSet::parse(Some(raw));

        assert_eq!(set.len(), 2);
        assert_eq!(set.get("a1").unwrap().shape, WindowShape::new(0, 0, 800, 600));
        assert_eq!(set.get("b1").unwrap().shape, WindowShape::new(-800, 11, 800, 600));
        assert!(set.get("a1").unwrap().metadata.is_none());
    }

    #[test]
    fn test_parse_absent_or_corrupt_is_empty() {
        assert!(WindowSet::parse(None).is_empty());
        assert!(WindowSet::parse(Some("")).is_empty());
        assert!(WindowSet::parse(Some("{not json")).is_empty());
        assert!(WindowSet::parse(Some(r#"{"id":"a1"}"#)).is_empty());
        assert!(WindowSet::parse(Some("null")).is_empty());
    }

    #[test]
    fn test_serialized_as_sequence() {
        let mut set = WindowSet::new();
        set.upsert(WindowRecord::new("a1", WindowShape::new(0, 0, 800, 600)));

        let json = set.to_json().unwrap();
        assert_eq!(json, r#"[{"id":"a1","shape":{"x":0,"y":0,"w":800,"h":600}}]"#);
    }

    #[test]
    fn test_metadata_uses_camel_case_wire_key() {
        let record = WindowRecord::new("a1", WindowShape::new(1, 2, 3, 4))
            .with_metadata(serde_json::json!({"foo": "bar"}));
        let json = serde_json::to_string(&record).unwrap();

        assert!(json.contains(r#""metaData":{"foo":"bar"}"#));
        let back: WindowRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_upsert_keeps_order_and_uniqueness() {
        let mut set = WindowSet::new();
        set.upsert(WindowRecord::new("a1", WindowShape::new(0, 0, 10, 10)));
        set.upsert(WindowRecord::new("b1", WindowShape::new(10, 0, 10, 10)));
        set.upsert(WindowRecord::new("a1", WindowShape::new(5, 5, 10, 10)));

        let ids: Vec<&str> = set.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a1", "b1"]);
        assert_eq!(set.get("a1").unwrap().shape.x, 5);
    }

    #[test]
    fn test_duplicate_ids_in_storage_collapse() {
        let raw = r#"[{"id":"a1","shape":{"x":0,"y":0,"w":1,"h":1}},
                      {"id":"a1","shape":{"x":9,"y":9,"w":1,"h":1}}]"#;
        let set = WindowSet::parse(Some(raw));

        assert_eq!(set.len(), 1);
        assert_eq!(set.get("a1").unwrap().shape.x, 9);
    }

    #[test]
    fn test_remove_and_set_shape() {
        let mut set: WindowSet = vec![
            WindowRecord::new("a1", WindowShape::new(0, 0, 10, 10)),
            WindowRecord::new("b1", WindowShape::new(10, 0, 10, 10)),
        ]
        .into_iter()
        .collect();

        assert!(set.set_shape("b1", WindowShape::new(20, 0, 10, 10)));
        assert!(!set.set_shape("zz", WindowShape::default()));
        assert_eq!(set.remove("a1").map(|r| r.id), Some("a1".to_string()));
        assert!(set.remove("a1").is_none());
        assert_eq!(set.len(), 1);
        assert_eq!(set.get("b1").unwrap().shape.x, 20);
    }

    #[test]
    fn test_center_and_display() {
        let shape = WindowShape::new(100, -50, 800, 600);
        assert_eq!(shape.center(), (500.0, 250.0));
        assert_eq!(shape.to_string(), "800x600+100+-50");
        assert_eq!(shape.translated(10, 5), WindowShape::new(110, -45, 800, 600));
        assert_eq!(
            WindowShape::new(i32::MIN + 1, i32::MAX - 1, 1, 1).translated(-5, 5),
            WindowShape::new(i32::MIN, i32::MAX, 1, 1)
        );
    }
}
