//! Typed tools the model can call back into.
//!
//! A [`Tool`] pairs a name and description with the JSON schema of its argument
//! type and a type-erased callback. Backends only see the schema and call
//! [`Tool::call`] with the raw JSON the model produced; the argument type is
//! recovered at call time.

use std::any::{Any, TypeId, type_name};
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::LLMError;
use crate::schema::generate_schema;

type BoxError = Box<dyn StdError + Send + Sync>;
type ErasedCallback<A> = Box<dyn Fn(A) -> Result<String, BoxError> + Send + Sync>;

/// A callback with its argument type erased.
///
/// Built with [`function`]. The argument type is only checked against the tool's
/// declared type when the tool is called.
#[derive(Clone)]
pub struct FunctionBody {
    arg_type: TypeId,
    arg_type_name: &'static str,
    callback: Arc<dyn Any + Send + Sync>,
}

impl FunctionBody {
    /// Name of the argument type the callback accepts.
    pub fn argument_type_name(&self) -> &'static str {
        self.arg_type_name
    }

    fn accepts(&self, arg_type: TypeId) -> bool {
        self.arg_type == arg_type
    }
}

impl fmt::Debug for FunctionBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionBody")
            .field("argument", &self.arg_type_name)
            .finish()
    }
}

/// Erases a typed callback into a [`FunctionBody`].
///
/// # Examples
///
/// ```
/// use kotoba_adapter::tool::function;
///
/// let body = function(|name: String| Ok::<_, std::convert::Infallible>(format!("hello {name}")));
/// assert_eq!(body.argument_type_name(), "alloc::string::String");
/// ```
pub fn function<A, F, E>(callback: F) -> FunctionBody
where
    A: 'static,
    F: Fn(A) -> Result<String, E> + Send + Sync + 'static,
    E: Into<BoxError>,
{
    let erased: ErasedCallback<A> = Box::new(move |args| callback(args).map_err(Into::into));
    FunctionBody {
        arg_type: TypeId::of::<A>(),
        arg_type_name: type_name::<A>(),
        callback: Arc::new(erased),
    }
}

/// A named, schema-described callback exposed to the model.
#[derive(Clone)]
pub struct Tool {
    name: String,
    description: String,
    parameters: Value,
    arg_type: TypeId,
    arg_type_name: &'static str,
    invoke: fn(&Tool, &[u8]) -> Result<String, LLMError>,
    body: FunctionBody,
}

impl Tool {
    /// Declares a tool whose arguments decode into `A`.
    ///
    /// The JSON schema advertised to the model is generated from `A`. The body is
    /// expected to take an `A`; a mismatch is reported when the tool is called.
    pub fn new<A>(name: impl Into<String>, description: impl Into<String>, body: FunctionBody) -> Self
    where
        A: DeserializeOwned + JsonSchema + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: generate_schema::<A>(),
            arg_type: TypeId::of::<A>(),
            arg_type_name: type_name::<A>(),
            invoke: invoke_with::<A>,
            body,
        }
    }

    /// Declares a tool directly from a typed callback.
    ///
    /// # Examples
    ///
    /// ```
    /// use kotoba_adapter::tool::Tool;
    /// use schemars::JsonSchema;
    /// use serde::Deserialize;
    ///
    /// #[derive(Deserialize, JsonSchema)]
    /// struct Weather {
    ///     location: String,
    /// }
    ///
    /// let tool = Tool::from_fn("get_weather", "Current weather", |args: Weather| {
    ///     Ok::<_, std::convert::Infallible>(format!("sunny in {}", args.location))
    /// });
    /// assert_eq!(tool.call(br#"{"location":"Paris"}"#).unwrap(), "sunny in Paris");
    /// ```
    pub fn from_fn<A, F, E>(name: impl Into<String>, description: impl Into<String>, callback: F) -> Self
    where
        A: DeserializeOwned + JsonSchema + 'static,
        F: Fn(A) -> Result<String, E> + Send + Sync + 'static,
        E: Into<BoxError>,
    {
        Self::new::<A>(name, description, function(callback))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// JSON schema of the argument object.
    pub fn parameters(&self) -> &Value {
        &self.parameters
    }

    /// Decodes `arguments` and invokes the callback.
    ///
    /// An empty payload is treated as `{}`, which some models send for tools
    /// without parameters.
    ///
    /// # Errors
    ///
    /// - [`LLMError::ToolArguments`] when the JSON does not match the declared
    ///   shape; the callback is not invoked.
    /// - [`LLMError::ToolSignature`] when the callback takes another type.
    /// - [`LLMError::ToolFailed`] carrying the callback's own error.
    pub fn call(&self, arguments: impl AsRef<[u8]>) -> Result<String, LLMError> {
        let arguments = arguments.as_ref();
        let arguments: &[u8] = if arguments.iter().all(u8::is_ascii_whitespace) {
            b"{}"
        } else {
            arguments
        };
        tracing::debug!(tool = %self.name, "invoking tool");
        let result = (self.invoke)(self, arguments);
        if let Err(err) = &result {
            tracing::warn!(tool = %self.name, "tool call failed: {err}");
        }
        result
    }
}

fn invoke_with<A: DeserializeOwned + 'static>(tool: &Tool, arguments: &[u8]) -> Result<String, LLMError> {
    let args: A = serde_json::from_slice(arguments).map_err(|err| LLMError::ToolArguments {
        tool: tool.name.clone(),
        message: err.to_string(),
    })?;

    let signature_error = || LLMError::ToolSignature {
        tool: tool.name.clone(),
        message: format!(
            "callback should take one argument of type {}, not {}",
            tool.arg_type_name, tool.body.arg_type_name
        ),
    };
    if !tool.body.accepts(tool.arg_type) {
        return Err(signature_error());
    }
    let callback = tool
        .body
        .callback
        .downcast_ref::<ErasedCallback<A>>()
        .ok_or_else(signature_error)?;

    callback(args).map_err(|source| LLMError::ToolFailed {
        tool: tool.name.clone(),
        source: Arc::from(source),
    })
}

impl fmt::Debug for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("argument", &self.arg_type_name)
            .finish()
    }
}
