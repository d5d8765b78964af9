use scribble_core::ast::{DynamicRoleDecl, Protocol, Receivers, Role, Statement};

pub fn role(s: &str) -> Role {
    Role::new(s)
}

pub fn msg(from: &str, to: &str, label: &str) -> Statement {
    Statement::Message {
        from: role(from),
        to: Receivers::One(role(to)),
        label: label.to_string(),
        payload_type: None,
        span: None,
    }
}

pub fn multicast(from: &str, to: &[&str], label: &str) -> Statement {
    Statement::Message {
        from: role(from),
        to: Receivers::Many(to.iter().map(|r| role(r)).collect()),
        label: label.to_string(),
        payload_type: None,
        span: None,
    }
}

pub fn seq(stmts: Vec<Statement>) -> Statement {
    Statement::Sequence(stmts)
}

pub fn choice(at: &str, branches: Vec<Statement>) -> Statement {
    Statement::Choice {
        at: role(at),
        branches,
        span: None,
    }
}

pub fn parallel(branches: Vec<Statement>) -> Statement {
    Statement::Parallel {
        branches,
        span: None,
    }
}

pub fn recursion(label: &str, body: Statement) -> Statement {
    Statement::Recursion {
        label: label.to_string(),
        body: Box::new(body),
        span: None,
    }
}

pub fn cont(label: &str) -> Statement {
    Statement::Continue {
        label: label.to_string(),
        span: None,
    }
}

pub fn updatable_continue(label: &str, update_body: Statement) -> Statement {
    Statement::UpdatableContinue {
        label: label.to_string(),
        update_body: Box::new(update_body),
        span: None,
    }
}

pub fn end() -> Statement {
    Statement::End
}

pub fn protocol(name: &str, roles: &[&str], body: Statement) -> Protocol {
    Protocol {
        name: name.to_string(),
        roles: roles.iter().map(|r| role(r)).collect(),
        dynamic_roles: Vec::<DynamicRoleDecl>::new(),
        body,
    }
}
