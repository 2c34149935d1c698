// Models module - Database entity representations

pub mod bus;
pub mod company;
pub mod municipality;
pub mod role;
pub mod route;
pub mod route_stop;
pub mod ticket;
pub mod trip;
pub mod user;

pub use bus::Bus;
pub use company::Company;
pub use municipality::Municipality;
pub use role::Role;
pub use route::Route;
pub use route_stop::RouteStop;
pub use ticket::{Ticket, TicketReceipt, TicketStatus};
pub use trip::Trip;
pub use user::User;
