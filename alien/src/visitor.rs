use crate::Value;

pub trait Visitable {
    fn visit_edges(&self, visitor: &mut dyn Visitor) {
        let _ = visitor;
    }
}

pub trait Visitor {
    fn visit(&mut self, value: Value);
}

impl<F: FnMut(Value)> Visitor for F {
    #[inline]
    fn visit(&mut self, value: Value) {
        self(value)
    }
}
