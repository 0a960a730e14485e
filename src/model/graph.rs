//! Derived tensors of one training step
//!
//! Every loss reads nodes of a small fixed graph: the two real batches are
//! leaves, each other node is one generator applied to one earlier node.
//! The graph is evaluated once per step, parents first.

use tch::{nn::ModuleT, Tensor};

/// One of the two generators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mapping {
    /// G_A: domain A to domain B
    AtoB,
    /// G_B: domain B to domain A
    BtoA,
}

/// Named node of the forward graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Node {
    RealA,
    RealB,
    FakeB,
    FakeA,
    RecA,
    RecB,
    IdtA,
    IdtB,
}

impl Node {
    pub fn name(self) -> &'static str {
        match self {
            Node::RealA => "real_A",
            Node::RealB => "real_B",
            Node::FakeB => "fake_B",
            Node::FakeA => "fake_A",
            Node::RecA => "rec_A",
            Node::RecB => "rec_B",
            Node::IdtA => "idt_A",
            Node::IdtB => "idt_B",
        }
    }

    /// Generator and parent producing this node; `None` for the real batches
    pub fn producer(self) -> Option<(Mapping, Node)> {
        match self {
            Node::RealA | Node::RealB => None,
            Node::FakeB => Some((Mapping::AtoB, Node::RealA)),
            Node::FakeA => Some((Mapping::BtoA, Node::RealB)),
            Node::RecA => Some((Mapping::BtoA, Node::FakeB)),
            Node::RecB => Some((Mapping::AtoB, Node::FakeA)),
            Node::IdtA => Some((Mapping::AtoB, Node::RealB)),
            Node::IdtB => Some((Mapping::BtoA, Node::RealA)),
        }
    }
}

/// Values of the forward graph for one batch
#[derive(Debug)]
pub struct ForwardGraph {
    real_a: Tensor,
    real_b: Tensor,
    fake_b: Tensor,
    fake_a: Tensor,
    rec_a: Tensor,
    rec_b: Tensor,
    identity: Option<(Tensor, Tensor)>,
}

impl ForwardGraph {
    /// Run both generators over the graph. Each node is computed exactly once,
    /// after its parent; the identity nodes only when `with_identity` is set.
    pub fn evaluate(
        gen_a: &dyn ModuleT,
        gen_b: &dyn ModuleT,
        real_a: &Tensor,
        real_b: &Tensor,
        with_identity: bool,
        train: bool,
    ) -> Self {
        let run = |node: Node, parent: &Tensor| match node.producer() {
            Some((Mapping::AtoB, _)) => gen_a.forward_t(parent, train),
            Some((Mapping::BtoA, _)) => gen_b.forward_t(parent, train),
            None => parent.shallow_clone(),
        };

        let fake_b = run(Node::FakeB, real_a);
        let fake_a = run(Node::FakeA, real_b);
        let rec_a = run(Node::RecA, &fake_b);
        let rec_b = run(Node::RecB, &fake_a);
        let identity = with_identity.then(|| (run(Node::IdtA, real_b), run(Node::IdtB, real_a)));

        Self {
            real_a: real_a.shallow_clone(),
            real_b: real_b.shallow_clone(),
            fake_b,
            fake_a,
            rec_a,
            rec_b,
            identity,
        }
    }

    /// Value of `node`; `None` only for identity nodes when disabled
    pub fn get(&self, node: Node) -> Option<&Tensor> {
        match node {
            Node::RealA => Some(&self.real_a),
            Node::RealB => Some(&self.real_b),
            Node::FakeB => Some(&self.fake_b),
            Node::FakeA => Some(&self.fake_a),
            Node::RecA => Some(&self.rec_a),
            Node::RecB => Some(&self.rec_b),
            Node::IdtA => self.identity.as_ref().map(|(idt_a, _)| idt_a),
            Node::IdtB => self.identity.as_ref().map(|(_, idt_b)| idt_b),
        }
    }

    pub fn real_a(&self) -> &Tensor {
        &self.real_a
    }

    pub fn real_b(&self) -> &Tensor {
        &self.real_b
    }

    pub fn fake_a(&self) -> &Tensor {
        &self.fake_a
    }

    pub fn fake_b(&self) -> &Tensor {
        &self.fake_b
    }

    pub fn rec_a(&self) -> &Tensor {
        &self.rec_a
    }

    pub fn rec_b(&self) -> &Tensor {
        &self.rec_b
    }

    /// (idt_A, idt_B) when the identity sub-step ran
    pub fn identity(&self) -> Option<(&Tensor, &Tensor)> {
        self.identity.as_ref().map(|(a, b)| (a, b))
    }

    /// Copy of the graph cut from autograd
    pub fn detach(&self) -> Self {
        Self {
            real_a: self.real_a.detach(),
            real_b: self.real_b.detach(),
            fake_b: self.fake_b.detach(),
            fake_a: self.fake_a.detach(),
            rec_a: self.rec_a.detach(),
            rec_b: self.rec_b.detach(),
            identity: self.identity.as_ref().map(|(a, b)| (a.detach(), b.detach())),
        }
    }
}
