use super::request_reader::{Command, Request, RequestReader};
use super::response_writer::{Response, ResponseWriter};
use crate::application::machine::VendingMachine;
use crate::error::{Result, VendingError};
use serde::Serialize;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::io::{BufRead, Write};
use tracing::debug;

const JSON_CONTENT_TYPE: &str = "application/json";

/// Outcome counts of a processed script.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub succeeded: usize,
    pub failed: usize,
}

/// Drives a [`VendingMachine`] from a request script.
///
/// Tokens returned by `login` are kept per username so later requests can
/// name a user with `as` instead of carrying the token. Products created
/// with a `label` can be referenced as `@label`.
pub struct Console {
    machine: VendingMachine,
    tokens: HashMap<String, String>,
    labels: HashMap<String, String>,
}

impl Console {
    pub fn new(machine: VendingMachine) -> Self {
        Self {
            machine,
            tokens: HashMap::new(),
            labels: HashMap::new(),
        }
    }

    pub fn machine(&self) -> &VendingMachine {
        &self.machine
    }

    /// Executes every request in `source`, writing one response per request.
    pub async fn run<R: BufRead, W: Write>(
        &mut self,
        source: R,
        sink: &mut ResponseWriter<W>,
    ) -> Result<RunSummary> {
        let mut summary = RunSummary::default();

        for (line, request) in RequestReader::new(source).requests() {
            let result = match request {
                Ok(request) => self.execute(request).await,
                Err(err) => Err(err),
            };
            match &result {
                Ok(_) => summary.succeeded += 1,
                Err(err) => {
                    debug!(line, error = %err, "request failed");
                    summary.failed += 1;
                }
            }
            sink.write(&Response::from_result(line, result))?;
        }

        sink.flush()?;
        Ok(summary)
    }

    pub async fn execute(&mut self, request: Request) -> Result<Value> {
        check_content_type(request.content_type.as_deref())?;
        let authorization = self.authorization(&request);
        let auth = authorization.as_deref();
        let machine = &self.machine;

        match request.command {
            Command::SignUp {
                username,
                password,
                role,
            } => to_body(&machine.sign_up(&username, &password, &role).await?),
            Command::Login { username, password } => {
                let token = machine.login(&username, &password).await?;
                self.tokens.insert(username, token.clone());
                Ok(json!({ "token": token }))
            }
            Command::Logout => {
                machine.logout(auth).await?;
                self.forget(request.principal.as_deref());
                Ok(Value::Null)
            }
            Command::LogoutAll => {
                machine.logout_all(auth).await?;
                self.forget(request.principal.as_deref());
                Ok(Value::Null)
            }
            Command::GetUser => to_body(&machine.current_user(auth).await?),
            Command::DeleteUser => {
                let deleted = machine.delete_current_user(auth).await?;
                self.tokens.remove(&deleted.username);
                to_body(&deleted)
            }
            Command::ResetDeposit => to_body(&machine.reset_deposit(auth).await?),
            Command::Deposit { coins } => to_body(&machine.deposit(auth, &coins).await?),
            Command::CreateProduct {
                name,
                available,
                cost,
                label,
            } => {
                let product = machine.create_product(auth, &name, available, cost).await?;
                if let Some(label) = label {
                    self.labels.insert(label, product.id.clone());
                }
                to_body(&product)
            }
            Command::ListProducts => to_body(&machine.list_products(auth).await?),
            Command::GetProduct { id } => {
                let id = self.resolve(&id)?;
                to_body(&machine.get_product(auth, &id).await?)
            }
            Command::UpdateProduct { id, patch } => {
                let id = self.resolve(&id)?;
                to_body(&machine.update_product(auth, &id, &patch).await?)
            }
            Command::DeleteProduct { id } => {
                let id = self.resolve(&id)?;
                to_body(&machine.delete_product(auth, &id).await?)
            }
            Command::Buy {
                product_id,
                quantity,
            } => {
                let id = self.resolve(&product_id)?;
                to_body(&machine.buy(auth, &id, quantity).await?)
            }
        }
    }

    fn authorization(&self, request: &Request) -> Option<String> {
        if let Some(token) = &request.token {
            return Some(token.clone());
        }
        request
            .principal
            .as_ref()
            .and_then(|user| self.tokens.get(user))
            .map(|token| format!("Bearer {token}"))
    }

    fn forget(&mut self, principal: Option<&str>) {
        if let Some(user) = principal {
            self.tokens.remove(user);
        }
    }

    fn resolve(&self, id: &str) -> Result<String> {
        match id.strip_prefix('@') {
            Some(label) => self
                .labels
                .get(label)
                .cloned()
                .ok_or_else(|| VendingError::not_found("product", id)),
            None => Ok(id.to_string()),
        }
    }
}

fn check_content_type(content_type: Option<&str>) -> Result<()> {
    let Some(content_type) = content_type else {
        return Ok(());
    };
    let media_type = content_type.split(';').next().unwrap_or_default().trim();
    if !media_type.eq_ignore_ascii_case(JSON_CONTENT_TYPE) {
        return Err(VendingError::ValidationError(format!(
            "unsupported content type: {content_type}"
        )));
    }
    Ok(())
}

fn to_body<T: Serialize>(value: &T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}
