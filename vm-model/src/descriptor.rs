use std::fmt::{Display, Formatter};

use itertools::Itertools;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum JavaType {
    Byte,
    Char,
    Double,
    Float,
    Int,
    Long,
    Short,
    Boolean,
    Void,
    /// internal form, e.g. `java/lang/Object`
    Class(String),
    Array(Box<JavaType>),
}

impl JavaType {
    /// long and double take two interpreter slots
    pub fn slot_size(&self) -> usize {
        match self {
            JavaType::Long | JavaType::Double => 2,
            JavaType::Void => 0,
            _ => 1,
        }
    }
}

impl Display for JavaType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            JavaType::Byte => write!(f, "byte"),
            JavaType::Char => write!(f, "char"),
            JavaType::Double => write!(f, "double"),
            JavaType::Float => write!(f, "float"),
            JavaType::Int => write!(f, "int"),
            JavaType::Long => write!(f, "long"),
            JavaType::Short => write!(f, "short"),
            JavaType::Boolean => write!(f, "boolean"),
            JavaType::Void => write!(f, "void"),
            JavaType::Class(name) => write!(f, "{}", external_class_name(name)),
            JavaType::Array(component) => write!(f, "{}[]", component),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MethodDescriptor {
    pub parameter_types: Vec<JavaType>,
    pub return_type: JavaType,
}

impl MethodDescriptor {
    pub fn parameter_slots(&self) -> usize {
        self.parameter_types.iter().map(|parameter| parameter.slot_size()).sum()
    }

    pub fn render_parameters(&self) -> String {
        self.parameter_types.iter().join(", ")
    }
}

pub fn external_class_name(internal: &str) -> String {
    internal.replace('/', ".")
}

fn eat_one(str_: &str) -> &str {
    &str_[1..]
}

fn parse_base_type(str_: &str) -> Option<(&str, JavaType)> {
    let base_type = match str_.chars().next()? {
        'B' => JavaType::Byte,
        'C' => JavaType::Char,
        'D' => JavaType::Double,
        'F' => JavaType::Float,
        'I' => JavaType::Int,
        'J' => JavaType::Long,
        'S' => JavaType::Short,
        'Z' => JavaType::Boolean,
        _ => return None,
    };
    Some((eat_one(str_), base_type))
}

fn parse_object_type(str_: &str) -> Option<(&str, JavaType)> {
    if !str_.starts_with('L') {
        return None;
    }
    let without_l = eat_one(str_);
    let end_index = without_l.find(';')?;
    let class_name = &without_l[..end_index];
    Some((&without_l[end_index + 1..], JavaType::Class(class_name.to_string())))
}

fn parse_array_type(str_: &str) -> Option<(&str, JavaType)> {
    if !str_.starts_with('[') {
        return None;
    }
    let (remaining, component) = parse_field_type(eat_one(str_))?;
    Some((remaining, JavaType::Array(Box::new(component))))
}

pub fn parse_field_type(str_: &str) -> Option<(&str, JavaType)> {
    parse_array_type(str_)
        .or_else(|| parse_base_type(str_))
        .or_else(|| parse_object_type(str_))
}

fn parse_return_type(str_: &str) -> Option<(&str, JavaType)> {
    if str_.starts_with('V') {
        return Some((eat_one(str_), JavaType::Void));
    }
    parse_field_type(str_)
}

pub fn parse_method_descriptor(str_: &str) -> Option<MethodDescriptor> {
    if !str_.starts_with('(') {
        return None;
    }
    let mut remaining = eat_one(str_);
    let mut parameter_types = vec![];
    while !remaining.starts_with(')') {
        let (rem, parameter_type) = parse_field_type(remaining)?;
        remaining = rem;
        parameter_types.push(parameter_type);
    }
    let (should_be_empty, return_type) = parse_return_type(eat_one(remaining))?;
    if !should_be_empty.is_empty() {
        return None;
    }
    Some(MethodDescriptor { parameter_types, return_type })
}

#[cfg(test)]
mod tests {
    use crate::descriptor::{JavaType, parse_method_descriptor};

    #[test]
    fn parse_and_render() {
        let desc = parse_method_descriptor("(J[Ljava/lang/String;I)V").unwrap();
        assert_eq!(desc.return_type, JavaType::Void);
        assert_eq!(desc.render_parameters(), "long, java.lang.String[], int");
        assert_eq!(desc.parameter_slots(), 4);
    }

    #[test]
    fn malformed() {
        assert!(parse_method_descriptor("J)V").is_none());
        assert!(parse_method_descriptor("(Ljava/lang/String").is_none());
        assert!(parse_method_descriptor("(I)VV").is_none());
    }
}
