use crate::PrimitiveMessageIndex;

#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    PushFixnum { value: i64 },
    PushFloat { value: f64 },
    PushBytes { value: Vec<u8> },
    PushBool { value: bool },
    SendPrimitive { id: PrimitiveMessageIndex },
    Drop,
}
