//! XMLヘッダをパス式で問い合わせる。
//!
//! パス式は`/`で区切った要素名の並びで、最後に`@属性名`を指定できる。
//! 要素名には`*`を指定でき、`[n]`（1始まり）で、その段階までに一致したすべての要素から
//! n番目の要素だけを選択する。
//! 例えば`/volume/scan/slice[2]/slicedata/rawdata[1]/@type`は、2番目のスライスに記録された
//! 最初の`rawdata`要素の`type`属性を示す。
use std::str::FromStr;

use crate::errors::{Rb5ReaderError, Rb5ReaderResult};

/// XML要素
#[derive(Debug, Clone, Default)]
pub struct Element {
    /// 要素名
    pub name: String,
    /// 属性
    pub attributes: Vec<(String, String)>,
    /// テキスト
    pub text: String,
    /// 子要素
    pub children: Vec<Element>,
}

impl Element {
    fn from_node(node: roxmltree::Node<'_, '_>) -> Self {
        Self {
            name: node.tag_name().name().to_string(),
            attributes: node
                .attributes()
                .map(|a| (a.name().to_string(), a.value().to_string()))
                .collect(),
            text: node
                .children()
                .filter(|n| n.is_text())
                .filter_map(|n| n.text())
                .collect(),
            children: node
                .children()
                .filter(|n| n.is_element())
                .map(Element::from_node)
                .collect(),
        }
    }

    /// 属性の値を返す。
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

/// パス式で一致したノード
#[derive(Debug, Clone, Copy)]
enum Matched<'a> {
    Element(&'a Element),
    Attribute(&'a str, &'a str),
}

impl<'a> Matched<'a> {
    fn name(&self) -> &'a str {
        match self {
            Matched::Element(e) => &e.name,
            Matched::Attribute(name, _) => name,
        }
    }

    fn value(&self) -> &'a str {
        match self {
            Matched::Element(e) => &e.text,
            Matched::Attribute(_, value) => value,
        }
    }
}

/// パス式の1段階
#[derive(Debug, Clone, PartialEq, Eq)]
struct Step<'p> {
    name: &'p str,
    position: Option<usize>,
}

impl<'p> Step<'p> {
    fn parse(step: &'p str) -> Option<Self> {
        match step.split_once('[') {
            Some((name, predicate)) => {
                let position = predicate.strip_suffix(']')?.trim().parse().ok()?;
                Some(Self {
                    name: name.trim(),
                    position: Some(position),
                })
            }
            None => Some(Self {
                name: step.trim(),
                position: None,
            }),
        }
    }

    fn matches(&self, name: &str) -> bool {
        self.name == "*" || self.name == name
    }
}

/// 解析済みのXMLヘッダ
#[derive(Debug, Clone)]
pub struct XmlTree {
    root: Element,
}

impl XmlTree {
    /// XMLヘッダを解析する。
    pub fn parse(text: &str) -> Rb5ReaderResult<Self> {
        let document = roxmltree::Document::parse(text)
            .map_err(|e| Rb5ReaderError::DocumentParse(format!("{e}")))?;

        Ok(Self {
            root: Element::from_node(document.root_element()),
        })
    }

    /// XMLヘッダのバイト列を解析する。
    pub fn parse_bytes(bytes: &[u8]) -> Rb5ReaderResult<Self> {
        let text = std::str::from_utf8(bytes).map_err(|e| {
            Rb5ReaderError::DocumentParse(format!(
                "utf8文字列に変換できないバイト列が記録されています。{e}"
            ))
        })?;
        Self::parse(text)
    }

    /// 最上位の要素を返す。
    pub fn root(&self) -> &Element {
        &self.root
    }

    fn evaluate<'a>(&'a self, path: &str) -> Vec<Matched<'a>> {
        let Some(relative) = path.strip_prefix('/') else {
            return Vec::new();
        };
        let mut current: Vec<&Element> = Vec::new();
        let mut first = true;
        for raw_step in relative.split('/') {
            if let Some(attribute) = raw_step.strip_prefix('@') {
                let attribute = attribute.trim();
                return current
                    .into_iter()
                    .filter_map(|e| {
                        e.attributes
                            .iter()
                            .find(|(n, _)| n == attribute)
                            .map(|(n, v)| Matched::Attribute(n.as_str(), v.as_str()))
                    })
                    .collect();
            }
            let Some(step) = Step::parse(raw_step) else {
                return Vec::new();
            };
            let mut next: Vec<&Element> = if first {
                vec![&self.root]
            } else {
                current
                    .iter()
                    .copied()
                    .flat_map(|e| e.children.iter())
                    .collect()
            };
            next.retain(|e| step.matches(&e.name));
            if let Some(position) = step.position {
                next = position
                    .checked_sub(1)
                    .and_then(|i| next.get(i).copied())
                    .into_iter()
                    .collect();
            }
            current = next;
            first = false;
        }

        current.into_iter().map(Matched::Element).collect()
    }

    /// パス式に一致したノードの数を返す。
    pub fn count(&self, path: &str) -> usize {
        self.evaluate(path).len()
    }

    /// パス式に一致したノードが存在するか確認する。
    pub fn exists(&self, path: &str) -> bool {
        self.count(path) > 0
    }

    /// パス式に最初に一致したノードの名前を返す。
    pub fn name(&self, path: &str) -> Option<&str> {
        self.evaluate(path).first().map(|m| m.name())
    }

    /// パス式に最初に一致したノードのテキストまたは属性値を返す。
    pub fn value(&self, path: &str) -> Option<&str> {
        self.evaluate(path).first().map(|m| m.value())
    }

    /// パス式に一致したすべてのノードのテキストまたは属性値を返す。
    pub fn values(&self, path: &str) -> Vec<&str> {
        self.evaluate(path).iter().map(|m| m.value()).collect()
    }

    /// パス式に最初に一致したノードの値を返す。
    ///
    /// 一致するノードがない場合は`AttributeNotFound`エラーを返す。
    pub fn require(&self, path: &str) -> Rb5ReaderResult<&str> {
        self.value(path)
            .ok_or_else(|| Rb5ReaderError::AttributeNotFound(path.to_string()))
    }

    /// パス式に最初に一致したノードの値を`T`に変換して返す。
    pub fn parse_value<T>(&self, path: &str) -> Rb5ReaderResult<T>
    where
        T: FromStr,
    {
        let value = self.require(path)?;
        parse_text(path, value)
    }

    /// パス式に一致したノードがある場合は、その値を`T`に変換して返す。
    pub fn parse_optional<T>(&self, path: &str) -> Rb5ReaderResult<Option<T>>
    where
        T: FromStr,
    {
        self.value(path).map(|v| parse_text(path, v)).transpose()
    }
}

/// テキストを`T`に変換する。
pub(crate) fn parse_text<T>(path: &str, value: &str) -> Rb5ReaderResult<T>
where
    T: FromStr,
{
    value.trim().parse::<T>().map_err(|_| Rb5ReaderError::InvalidValue {
        path: path.to_string(),
        value: value.to_string(),
    })
}
