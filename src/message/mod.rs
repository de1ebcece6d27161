/*
 * mod.rs
 *
 * This file is part of wayfarer-http.
 *
 * wayfarer-http is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * wayfarer-http is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 */

pub mod request;
pub mod response;

pub use request::{Body, Request, RequestParser};
pub use response::{Response, ResponseParser};
